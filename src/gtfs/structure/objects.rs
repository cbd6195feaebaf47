use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A line, as published to riders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    /// Falls back to the route id when the feed has no short name
    pub route_short_name: String,
    pub route_long_name: Option<String>,
    pub route_color: Option<String>,
    pub route_text_color: Option<String>,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.route_short_name)
    }
}

/// One scheduled call of a trip at a stop.
/// Times are offsets in seconds from the service day origin (local noon minus 12h).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub arrival_time: u32,
    pub departure_time: u32,
    pub stop_headsign: Option<String>,
    pub pickup_type: Option<i32>,
    pub drop_off_type: Option<i32>,
    pub timepoint: Option<i32>,
}

/// The parts of a stop time that make up a stop pattern:
/// everything except the trip and the clock values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StopPatternCell {
    pub stop_id: String,
    pub stop_sequence: u32,
    pub stop_headsign: Option<String>,
    pub pickup_type: Option<i32>,
    pub drop_off_type: Option<i32>,
    pub timepoint: Option<i32>,
}

impl From<&StopTime> for StopPatternCell {
    fn from(st: &StopTime) -> Self {
        StopPatternCell {
            stop_id: st.stop_id.clone(),
            stop_sequence: st.stop_sequence,
            stop_headsign: st.stop_headsign.clone(),
            pickup_type: st.pickup_type,
            drop_off_type: st.drop_off_type,
            timepoint: st.timepoint,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TripError {
    #[error("Trip {0} has no stop times")]
    NoStopTimes(String),

    #[error("Trip {0} repeats stop sequence {1}")]
    DuplicateStopSequence(String, u32),
}

/// Trip fields as they come from trips.txt, before the stop times are attached
#[derive(Debug, Clone)]
pub struct TripHeader {
    pub trip_id: String,
    pub route: Arc<Route>,
    pub direction_id: u8,
    pub service_id: String,
    pub block_id: Option<String>,
    pub trip_headsign: Option<String>,
}

/// A scheduled trip with its ordered stop times. Never empty.
#[derive(Debug, Clone)]
pub struct Trip {
    pub trip_id: String,
    pub route: Arc<Route>,
    pub direction_id: u8,
    pub service_id: String,
    pub block_id: Option<String>,
    pub trip_headsign: Option<String>,
    stop_times: Vec<StopTime>,
}

impl Trip {
    pub fn new(header: TripHeader, mut stop_times: Vec<StopTime>) -> Result<Trip, TripError> {
        if stop_times.is_empty() {
            return Err(TripError::NoStopTimes(header.trip_id));
        }

        stop_times.sort_by_key(|st| st.stop_sequence);
        if let Some(dup) = stop_times
            .windows(2)
            .find(|w| w[0].stop_sequence == w[1].stop_sequence)
        {
            return Err(TripError::DuplicateStopSequence(
                header.trip_id,
                dup[0].stop_sequence,
            ));
        }

        Ok(Trip {
            trip_id: header.trip_id,
            route: header.route,
            direction_id: header.direction_id,
            service_id: header.service_id,
            block_id: header.block_id,
            trip_headsign: header.trip_headsign,
            stop_times,
        })
    }

    pub fn stop_times(&self) -> &[StopTime] {
        &self.stop_times
    }

    fn first_stop_time(&self) -> &StopTime {
        &self.stop_times[0]
    }

    fn last_stop_time(&self) -> &StopTime {
        &self.stop_times[self.stop_times.len() - 1]
    }

    pub fn first_departure(&self) -> u32 {
        self.first_stop_time().departure_time
    }

    pub fn last_arrival(&self) -> u32 {
        self.last_stop_time().arrival_time
    }

    pub fn first_stop_sequence(&self) -> u32 {
        self.first_stop_time().stop_sequence
    }

    pub fn last_stop_sequence(&self) -> u32 {
        self.last_stop_time().stop_sequence
    }

    pub fn stop_time_at_sequence(&self, stop_sequence: u32) -> Option<&StopTime> {
        self.stop_times
            .binary_search_by_key(&stop_sequence, |st| st.stop_sequence)
            .ok()
            .map(|i| &self.stop_times[i])
    }

    pub fn stop_pattern(&self) -> Vec<StopPatternCell> {
        self.stop_times.iter().map(StopPatternCell::from).collect()
    }
}

impl fmt::Display for Trip {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} - {} [{:>3}-{}] {}",
            format_offset(self.first_departure()),
            format_offset(self.last_arrival()),
            self.route.route_short_name,
            self.direction_id,
            self.trip_headsign.as_deref().unwrap_or("")
        )
    }
}

/// Formats an offset as GTFS-style `H:MM`
pub fn format_offset(offset: u32) -> String {
    format!("{}:{:02}", offset / 3600, offset % 3600 / 60)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{route, stop_time};

    fn header(trip_id: &str) -> TripHeader {
        TripHeader {
            trip_id: trip_id.to_string(),
            route: route("72"),
            direction_id: 0,
            service_id: "WK".to_string(),
            block_id: Some("B1".to_string()),
            trip_headsign: Some("Downtown".to_string()),
        }
    }

    #[test]
    fn test_trip_sorts_stop_times() {
        let trip = Trip::new(
            header("t1"),
            vec![
                stop_time("t1", "C", 7, 3600 + 600),
                stop_time("t1", "A", 1, 3600),
                stop_time("t1", "B", 4, 3600 + 300),
            ],
        )
        .unwrap();

        assert_eq!(trip.first_stop_sequence(), 1);
        assert_eq!(trip.last_stop_sequence(), 7);
        assert_eq!(trip.first_departure(), 3600);
        assert_eq!(trip.last_arrival(), 4200);
        assert_eq!(trip.stop_time_at_sequence(4).unwrap().stop_id, "B");
        assert!(trip.stop_time_at_sequence(5).is_none());
        assert_eq!(trip.to_string(), "1:00 - 1:10 [ 72-0] Downtown");
    }

    #[test]
    fn test_trip_rejects_bad_stop_times() {
        assert_eq!(
            Trip::new(header("t1"), vec![]).unwrap_err(),
            TripError::NoStopTimes("t1".to_string())
        );
        assert_eq!(
            Trip::new(
                header("t2"),
                vec![stop_time("t2", "A", 1, 0), stop_time("t2", "B", 1, 60)]
            )
            .unwrap_err(),
            TripError::DuplicateStopSequence("t2".to_string(), 1)
        );
    }
}
