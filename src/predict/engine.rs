use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::status::{BlockStatus, TripStatus};
use crate::gtfs::structure::Trip;
use crate::gtfs::utils::{service_day_naive, service_day_start, DateError};
use crate::observations::{ObservationIndex, VehicleObservation, VehicleStopStatus};

/// Trips that aren't due yet are given this long before they count as missing
const GRACE_PERIOD_SECS: i64 = 360;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PredictError {
    #[error("Trip {trip_id} was observed at stop sequence {stop_sequence}, which it doesn't have")]
    UnknownStopSequence { trip_id: String, stop_sequence: u32 },

    #[error("Invalid service date: {0}")]
    ServiceDate(#[from] DateError),
}

pub type PredictResult<T> = Result<T, PredictError>;

/// The believed state of one trip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripPrediction {
    pub trip_id: String,
    pub block_id: Option<String>,
    pub route_id: String,
    pub route_short_name: String,
    pub direction_id: u8,
    pub headsign: Option<String>,
    pub route_color: Option<String>,
    pub route_text_color: Option<String>,
    /// Local time
    pub scheduled_start: NaiveDateTime,
    /// Local time
    pub scheduled_end: NaiveDateTime,
    pub status: TripStatus,
    pub block_status: BlockStatus,
    /// Seconds behind schedule at the furthest observed stop
    pub live_delay: Option<i64>,
}

/// Predictions for every active trip of a service date, at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predictions {
    pub service_date: NaiveDate,
    pub evaluated_at: DateTime<Utc>,
    pub trips: BTreeMap<String, TripPrediction>,
}

impl Predictions {
    /// Block id to trip id to prediction. Trips without a block stand alone under their trip id.
    pub fn blocks(&self) -> BTreeMap<String, BTreeMap<String, TripPrediction>> {
        let mut blocks = BTreeMap::<String, BTreeMap<String, TripPrediction>>::new();
        for (trip_id, prediction) in &self.trips {
            let block_id = prediction.block_id.as_ref().unwrap_or(trip_id);
            blocks
                .entry(block_id.clone())
                .or_default()
                .insert(trip_id.clone(), prediction.clone());
        }
        blocks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripEvaluation {
    pub status: TripStatus,
    pub live_delay: Option<i64>,
}

/// Everything needed to evaluate trips of one service date
struct ServiceDay<'a> {
    start: DateTime<Tz>,
    observations: &'a ObservationIndex,
    cancelled: &'a BTreeSet<String>,
    now: DateTime<Utc>,
}

impl<'a> ServiceDay<'a> {
    fn at(&self, offset_secs: u32) -> DateTime<Utc> {
        (self.start + Duration::seconds(offset_secs as i64)).with_timezone(&Utc)
    }

    fn evaluate(&self, trip: &Trip) -> PredictResult<TripEvaluation> {
        if self.cancelled.contains(&trip.trip_id) {
            return Ok(TripEvaluation {
                status: TripStatus::Cancelled,
                live_delay: None,
            });
        }

        let latest = self
            .observations
            .get(&trip.trip_id)
            .and_then(|observations| observations.iter().max_by_key(|o| o.stop_sequence));

        match latest {
            Some(latest) => self.evaluate_observed(trip, latest),
            None => Ok(self.evaluate_unobserved(trip)),
        }
    }

    fn evaluate_observed(
        &self,
        trip: &Trip,
        latest: &VehicleObservation,
    ) -> PredictResult<TripEvaluation> {
        let stop_time = trip
            .stop_time_at_sequence(latest.stop_sequence)
            .ok_or_else(|| PredictError::UnknownStopSequence {
                trip_id: trip.trip_id.clone(),
                stop_sequence: latest.stop_sequence,
            })?;

        let live_delay = (latest.observed_at - self.at(stop_time.arrival_time))
            .num_seconds()
            .max(0);
        let evaluation = |status| TripEvaluation {
            status,
            live_delay: Some(live_delay),
        };

        let at_last_stop = latest.stop_sequence == trip.last_stop_sequence();
        let at_stop = matches!(
            latest.vehicle_status,
            VehicleStopStatus::StoppedAt | VehicleStopStatus::IncomingAt
        );
        if at_last_stop && at_stop {
            return Ok(evaluation(TripStatus::Arrived));
        }

        // Positions are polled, so the last stop is easily never seen
        let live_end = self.at(trip.last_arrival()) + Duration::seconds(live_delay);
        if self.now > live_end {
            return Ok(evaluation(TripStatus::Arrived));
        }

        if latest.stop_sequence == trip.first_stop_sequence()
            && latest.vehicle_status == VehicleStopStatus::StoppedAt
        {
            return Ok(evaluation(TripStatus::Waiting));
        }

        Ok(evaluation(TripStatus::Departed))
    }

    fn evaluate_unobserved(&self, trip: &Trip) -> TripEvaluation {
        let delay = (self.now - self.at(trip.first_departure())).num_seconds();

        let status = if delay < GRACE_PERIOD_SECS {
            TripStatus::Scheduled
        } else if self.now > self.at(trip.last_arrival()) {
            TripStatus::Missed
        } else {
            TripStatus::Missing
        };

        TripEvaluation {
            status,
            live_delay: None,
        }
    }
}

/// Groups trips into blocks, each ordered by first departure then trip id.
/// A trip without a block is its own block, keyed by its trip id.
pub fn group_blocks<'a>(trips: &[&'a Trip]) -> BTreeMap<String, Vec<&'a Trip>> {
    let mut blocks = BTreeMap::<String, Vec<&Trip>>::new();
    for trip in trips {
        let block_id = trip.block_id.as_ref().unwrap_or(&trip.trip_id);
        blocks.entry(block_id.clone()).or_default().push(*trip);
    }

    for trips in blocks.values_mut() {
        trips.sort_by(|a, b| {
            a.first_departure()
                .cmp(&b.first_departure())
                .then_with(|| a.trip_id.cmp(&b.trip_id))
        });
    }

    blocks
}

/// Evaluates every trip of the service date as of `now`
pub fn predict(
    trips: &[&Trip],
    service_date: &NaiveDate,
    timezone: &Tz,
    observations: &ObservationIndex,
    cancelled: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> PredictResult<Predictions> {
    let day = ServiceDay {
        start: service_day_start(service_date, timezone)?,
        observations,
        cancelled,
        now,
    };

    let mut predictions = BTreeMap::new();

    for (block_id, block_trips) in group_blocks(trips) {
        log::debug!("Block {}", block_id);
        let mut block_status = BlockStatus::Scheduled;

        for trip in block_trips {
            let evaluation = day.evaluate(trip)?;

            let trip_block_status = if trip.block_id.is_some() {
                block_status = block_status.after(evaluation.status);
                block_status
            } else {
                BlockStatus::IgnoreBlock
            };

            log::debug!("{:3} {:10} {}", evaluation.status, trip_block_status, trip);

            predictions.insert(
                trip.trip_id.clone(),
                TripPrediction {
                    trip_id: trip.trip_id.clone(),
                    block_id: trip.block_id.clone(),
                    route_id: trip.route.route_id.clone(),
                    route_short_name: trip.route.route_short_name.clone(),
                    direction_id: trip.direction_id,
                    headsign: trip.trip_headsign.clone(),
                    route_color: trip.route.route_color.clone(),
                    route_text_color: trip.route.route_text_color.clone(),
                    scheduled_start: service_day_naive(service_date, trip.first_departure()),
                    scheduled_end: service_day_naive(service_date, trip.last_arrival()),
                    status: evaluation.status,
                    block_status: trip_block_status,
                    live_delay: evaluation.live_delay,
                },
            );
        }
    }

    Ok(Predictions {
        service_date: *service_date,
        evaluated_at: now,
        trips: predictions,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{at, date, observation, trip};
    use VehicleStopStatus::*;

    // 07:15 to 07:55, stop sequences 1 to 3
    const START: u32 = 26100;
    const END: u32 = START + 40 * 60;

    fn day() -> NaiveDate {
        date(2024, 3, 3)
    }

    fn t1() -> Trip {
        trip("t1", "72", Some("B1"), START, &[("A", 0), ("B", 20), ("C", 40)])
    }

    fn observe(
        index: &mut ObservationIndex,
        trip_id: &str,
        seq: u32,
        status: VehicleStopStatus,
        offset: i64,
    ) {
        let observed_at = at(day(), offset).timestamp();
        index
            .entry(trip_id.to_string())
            .or_default()
            .push(observation(day(), trip_id, seq, status, observed_at));
    }

    fn evaluate_at(trip: &Trip, observations: &ObservationIndex, now: i64) -> TripEvaluation {
        evaluate_with(trip, observations, &BTreeSet::new(), now)
    }

    fn evaluate_with(
        trip: &Trip,
        observations: &ObservationIndex,
        cancelled: &BTreeSet<String>,
        now: i64,
    ) -> TripEvaluation {
        let predictions = predict(
            &[trip],
            &day(),
            &chrono_tz::UTC,
            observations,
            cancelled,
            at(day(), now),
        )
        .unwrap();
        let prediction = &predictions.trips[&trip.trip_id];
        TripEvaluation {
            status: prediction.status,
            live_delay: prediction.live_delay,
        }
    }

    #[test]
    fn test_unobserved() {
        let trip = t1();
        let none = ObservationIndex::new();
        let start = START as i64;
        let end = END as i64;

        assert_eq!(evaluate_at(&trip, &none, start - 3600).status, TripStatus::Scheduled);
        assert_eq!(evaluate_at(&trip, &none, start + 359).status, TripStatus::Scheduled);
        assert_eq!(evaluate_at(&trip, &none, start + 360).status, TripStatus::Missing);
        assert_eq!(evaluate_at(&trip, &none, end).status, TripStatus::Missing);
        assert_eq!(evaluate_at(&trip, &none, end + 1).status, TripStatus::Missed);
        assert_eq!(evaluate_at(&trip, &none, end + 1).live_delay, None);
    }

    #[test]
    fn test_spring_forward_day() {
        let trip = t1();
        let spring = date(2024, 3, 10);
        // 07:22 PDT, seven minutes after the 07:15 departure
        let now = spring.and_hms_opt(14, 22, 0).unwrap().and_utc();

        let predictions = predict(
            &[&trip],
            &spring,
            &chrono_tz::America::Vancouver,
            &ObservationIndex::new(),
            &BTreeSet::new(),
            now,
        )
        .unwrap();
        assert_eq!(predictions.trips["t1"].status, TripStatus::Missing);
    }

    #[test]
    fn test_arrived_at_last_stop() {
        let trip = t1();
        for status in [StoppedAt, IncomingAt] {
            let mut index = ObservationIndex::new();
            observe(&mut index, "t1", 3, status, END as i64 - 60);
            // Even before the scheduled start
            assert_eq!(evaluate_at(&trip, &index, 0).status, TripStatus::Arrived);
        }

        let mut index = ObservationIndex::new();
        observe(&mut index, "t1", 3, InTransitTo, END as i64 - 60);
        assert_eq!(
            evaluate_at(&trip, &index, END as i64 - 30).status,
            TripStatus::Departed
        );
    }

    #[test]
    fn test_live_delay_extends_end() {
        let trip = t1();
        let mut index = ObservationIndex::new();
        // Five minutes late at B
        observe(&mut index, "t1", 2, InTransitTo, START as i64 + 20 * 60 + 300);

        let before = evaluate_at(&trip, &index, END as i64 + 200);
        assert_eq!(before.status, TripStatus::Departed);
        assert_eq!(before.live_delay, Some(300));

        assert_eq!(
            evaluate_at(&trip, &index, END as i64 + 301).status,
            TripStatus::Arrived
        );
    }

    #[test]
    fn test_early_running_has_no_negative_delay() {
        let trip = t1();
        let mut index = ObservationIndex::new();
        observe(&mut index, "t1", 2, InTransitTo, START as i64 + 20 * 60 - 120);

        let evaluation = evaluate_at(&trip, &index, END as i64 + 1);
        assert_eq!(evaluation.status, TripStatus::Arrived);
        assert_eq!(evaluation.live_delay, Some(0));
    }

    #[test]
    fn test_waiting_at_first_stop() {
        let trip = t1();
        let mut index = ObservationIndex::new();
        observe(&mut index, "t1", 1, StoppedAt, START as i64 - 120);
        assert_eq!(
            evaluate_at(&trip, &index, START as i64 - 60).status,
            TripStatus::Waiting
        );

        let mut index = ObservationIndex::new();
        observe(&mut index, "t1", 1, InTransitTo, START as i64 - 120);
        assert_eq!(
            evaluate_at(&trip, &index, START as i64 - 60).status,
            TripStatus::Departed
        );
    }

    #[test]
    fn test_latest_is_max_stop_sequence() {
        let trip = t1();
        let mut index = ObservationIndex::new();
        // The stop 1 row was written last, but stop 2 is further along
        observe(&mut index, "t1", 2, InTransitTo, START as i64 + 60);
        observe(&mut index, "t1", 1, StoppedAt, START as i64 + 120);

        assert_eq!(
            evaluate_at(&trip, &index, START as i64 + 180).status,
            TripStatus::Departed
        );
    }

    #[test]
    fn test_cancellation_overrides() {
        let trip = t1();
        let mut index = ObservationIndex::new();
        observe(&mut index, "t1", 3, StoppedAt, END as i64);
        let cancelled = BTreeSet::from(["t1".to_string()]);

        assert_eq!(
            evaluate_with(&trip, &index, &cancelled, END as i64 + 10).status,
            TripStatus::Cancelled
        );
        assert_eq!(
            evaluate_with(&trip, &ObservationIndex::new(), &cancelled, 0).status,
            TripStatus::Cancelled
        );
    }

    #[test]
    fn test_unknown_stop_sequence_fails() {
        let trip = t1();
        let mut index = ObservationIndex::new();
        observe(&mut index, "t1", 7, InTransitTo, START as i64);

        let result = predict(
            &[&trip],
            &day(),
            &chrono_tz::UTC,
            &index,
            &BTreeSet::new(),
            at(day(), START as i64),
        );
        assert_eq!(
            result.unwrap_err(),
            PredictError::UnknownStopSequence {
                trip_id: "t1".to_string(),
                stop_sequence: 7
            }
        );
    }

    #[test]
    fn test_block_propagation() {
        let stops = [("A", 0), ("B", 30)];
        let a = trip("a", "72", Some("B1"), 7 * 3600, &stops);
        let b = trip("b", "72", Some("B1"), 8 * 3600, &stops);
        let c = trip("c", "72", Some("B1"), 9 * 3600, &stops);
        let d = trip("d", "72", Some("B1"), 10 * 3600, &stops);
        let other = trip("e", "14", Some("B2"), 9 * 3600, &stops);
        let loose = trip("f", "14", None, 6 * 3600, &stops);

        let mut index = ObservationIndex::new();
        observe(&mut index, "a", 2, StoppedAt, 7 * 3600 + 30 * 60);
        let cancelled = BTreeSet::from(["d".to_string()]);

        let predictions = predict(
            &[&d, &c, &b, &a, &other, &loose],
            &day(),
            &chrono_tz::UTC,
            &index,
            &cancelled,
            at(day(), 8 * 3600 + 10 * 60),
        )
        .unwrap();

        let summary = |id: &str| {
            let p = &predictions.trips[id];
            (p.status, p.block_status)
        };
        assert_eq!(summary("a"), (TripStatus::Arrived, BlockStatus::BlockInService));
        assert_eq!(summary("b"), (TripStatus::Missing, BlockStatus::BlockMissed));
        assert_eq!(summary("c"), (TripStatus::Scheduled, BlockStatus::BlockMissed));
        assert_eq!(summary("d"), (TripStatus::Cancelled, BlockStatus::BlockMissed));
        assert_eq!(summary("e"), (TripStatus::Scheduled, BlockStatus::Scheduled));
        assert_eq!(summary("f"), (TripStatus::Missed, BlockStatus::IgnoreBlock));

        let blocks = predictions.blocks();
        assert_eq!(blocks.keys().collect::<Vec<_>>(), ["B1", "B2", "f"]);
        assert_eq!(blocks["B1"].len(), 4);
        assert_eq!(
            predictions.trips["b"].scheduled_start,
            day().and_hms_opt(8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_block_order_ties_by_trip_id() {
        let stops = [("A", 0), ("B", 30)];
        let second = trip("t2", "72", Some("B1"), 7 * 3600, &stops);
        let first = trip("t1", "72", Some("B1"), 7 * 3600, &stops);
        let later = trip("t0", "72", Some("B1"), 6 * 3600, &stops);

        let blocks = group_blocks(&[&second, &first, &later]);
        let order = blocks["B1"]
            .iter()
            .map(|t| t.trip_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, ["t0", "t1", "t2"]);
    }

    #[test]
    fn test_rerun_is_identical() {
        let stops = [("A", 0), ("B", 20), ("C", 40)];
        let trips = [
            trip("t3", "72", Some("B1"), 9 * 3600, &stops),
            trip("t1", "72", Some("B1"), 7 * 3600, &stops),
            trip("t2", "14", None, 8 * 3600, &stops),
        ];
        let refs = trips.iter().collect::<Vec<_>>();
        let mut index = ObservationIndex::new();
        observe(&mut index, "t1", 2, InTransitTo, 7 * 3600 + 25 * 60);
        observe(&mut index, "t1", 1, StoppedAt, 7 * 3600);
        let now = at(day(), 8 * 3600 + 600);

        let run = || {
            let predictions = predict(
                &refs,
                &day(),
                &chrono_tz::America::Vancouver,
                &index,
                &BTreeSet::new(),
                now,
            )
            .unwrap();
            (
                serde_json::to_string(&predictions).unwrap(),
                serde_json::to_string(&predictions.blocks()).unwrap(),
            )
        };

        assert_eq!(run(), run());
    }
}
