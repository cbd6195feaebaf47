use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sea_orm::ConnectionTrait;

use crate::alerts::track::stored_alerts;
use crate::alerts::{link_alerts_to_trips, RecognizedAlert};
use crate::entities::StopDeparture;
use crate::error::BelievabilityResult;
use crate::gtfs::itinerary::ItineraryIndex;
use crate::gtfs::schedule::{trips_by_route, Schedule};
use crate::gtfs::utils::{service_day_naive, service_day_start};
use crate::observations::observations_for_date;
use crate::predict::{predict, Predictions};

/// Trips on the service date cancelled by any stored alert
pub async fn cancelled_trips(
    db: &impl ConnectionTrait,
    schedule: &Schedule,
    service_date: &NaiveDate,
) -> BelievabilityResult<BTreeSet<String>> {
    let recognized = stored_alerts(db)
        .await?
        .into_iter()
        .map(|alert| RecognizedAlert::new(alert, &schedule.timezone))
        .collect::<Vec<_>>();

    let active = schedule.active_trips(service_date);
    Ok(link_alerts_to_trips(
        &trips_by_route(&active),
        service_date,
        &recognized,
    ))
}

/// Snapshots the stored observations and alerts, then runs the engine over them
pub async fn evaluate(
    db: &impl ConnectionTrait,
    schedule: &Schedule,
    service_date: &NaiveDate,
    now: DateTime<Utc>,
) -> BelievabilityResult<Predictions> {
    let observations = observations_for_date(db, service_date).await?;
    let cancelled = cancelled_trips(db, schedule, service_date).await?;

    let active = schedule.active_trips(service_date);
    let predictions = predict(
        &active,
        service_date,
        &schedule.timezone,
        &observations,
        &cancelled,
        now,
    )?;

    log::debug!(
        "Evaluated {} trips for {} ({} observed, {} cancelled)",
        predictions.trips.len(),
        service_date,
        observations.len(),
        cancelled.len()
    );

    Ok(predictions)
}

/// Departures of a route and direction from a stop at or after `after`
pub fn stop_departures(
    schedule: &Schedule,
    predictions: &Predictions,
    route_short_name: &str,
    direction_id: u8,
    stop_id: &str,
    after: DateTime<Utc>,
    limit: usize,
) -> BelievabilityResult<Vec<StopDeparture>> {
    let service_date = &predictions.service_date;
    let day_start = service_day_start(service_date, &schedule.timezone)?;

    let active = schedule.active_trips(service_date);
    let index = ItineraryIndex::new(&active);

    let departures = index
        .departures_at(route_short_name, direction_id, stop_id)
        .into_iter()
        .filter_map(|(trip, stop_time)| {
            let departs_at =
                (day_start + Duration::seconds(stop_time.departure_time as i64)).with_timezone(&Utc);
            if departs_at < after {
                return None;
            }
            let prediction = predictions.trips.get(&trip.trip_id)?;
            Some(StopDeparture {
                stop_id: stop_time.stop_id.clone(),
                stop_sequence: stop_time.stop_sequence,
                stop_headsign: stop_time.stop_headsign.clone(),
                scheduled_departure: service_day_naive(service_date, stop_time.departure_time),
                departure_timestamp: departs_at.timestamp(),
                trip: prediction.clone(),
            })
        })
        .take(limit)
        .collect();

    Ok(departures)
}
