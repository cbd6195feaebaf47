use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::error::{Error, RtResult};
use crate::gtfs::structure::realtime::FeedEntity;
use crate::gtfs::utils::parse_gtfs_date;
use crate::observations::{VehicleObservation, VehicleObservationBuilder};

/// Converts one feed entity into an observation.
/// Entities that can't be tied to a trip and stop sequence give `None`.
pub fn observation_from_entity(
    entity: &FeedEntity,
    timezone: &Tz,
    polled_at: DateTime<Utc>,
) -> RtResult<Option<VehicleObservation>> {
    let Some(vehicle) = &entity.vehicle else {
        return Ok(None);
    };
    let Some(trip) = &vehicle.trip else {
        log::debug!("Vehicle entity {} has no trip", entity.id);
        return Ok(None);
    };
    let (Some(trip_id), Some(stop_sequence)) = (&trip.trip_id, vehicle.current_stop_sequence)
    else {
        log::debug!("Vehicle entity {} has no trip id or stop sequence", entity.id);
        return Ok(None);
    };

    let service_date = match &trip.start_date {
        Some(start_date) => parse_gtfs_date(start_date)?,
        None => polled_at.with_timezone(timezone).date_naive(),
    };

    let mut builder = VehicleObservationBuilder::default();
    builder
        .service_date(service_date)
        .trip_id(trip_id.as_str())
        .stop_sequence(stop_sequence)
        .observed_at(vehicle.timestamp.unwrap_or(polled_at));

    if let Some(route_id) = &trip.route_id {
        builder.route_id(route_id.as_str());
    }
    if let Some(direction_id) = trip.direction_id.and_then(|d| u8::try_from(d).ok()) {
        builder.direction_id(direction_id);
    }
    if let Some(position) = &vehicle.position {
        builder
            .lat(position.latitude as f64)
            .lon(position.longitude as f64)
            // m/s to km/h
            .speed(position.speed.map(|s| s as f64 * 3.6).unwrap_or_default());
    }
    if let Some(stop_id) = &vehicle.stop_id {
        builder.stop_id(stop_id.as_str());
    }
    if let Some(vehicle_id) = vehicle.vehicle.as_ref().and_then(|v| v.id.as_ref()) {
        builder.vehicle_id(vehicle_id.as_str());
    }
    if let Some(status) = vehicle.current_status {
        builder.vehicle_status(status);
    }

    let observation = builder
        .build()
        .map_err(|e| Error::InvalidData(e.to_string()))?;
    Ok(Some(observation))
}
