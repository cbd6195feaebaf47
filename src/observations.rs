use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use derive_builder::Builder;
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::db::error::{DbError, DbResult};
use crate::entity::prelude::*;
use crate::entity::vehicle_updates;
use crate::gtfs::utils::{format_gtfs_date, parse_gtfs_date};

/// The status of a vehicle with respect to its current stop, as coded in GTFS-realtime
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize_repr, Deserialize_repr,
)]
#[repr(i32)]
pub enum VehicleStopStatus {
    /// About to arrive at the stop
    IncomingAt = 0,
    /// Standing at the stop
    StoppedAt = 1,
    /// Departed the previous stop and in transit
    InTransitTo = 2,
}

impl TryFrom<i32> for VehicleStopStatus {
    type Error = DbError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VehicleStopStatus::IncomingAt),
            1 => Ok(VehicleStopStatus::StoppedAt),
            2 => Ok(VehicleStopStatus::InTransitTo),
            other => Err(DbError::InvalidValue(format!(
                "Unknown vehicle status: {}",
                other
            ))),
        }
    }
}

/// One polled vehicle position, keyed by (service date, trip, stop sequence)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into))]
pub struct VehicleObservation {
    pub service_date: NaiveDate,
    pub trip_id: String,
    #[builder(default, setter(strip_option))]
    pub route_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub direction_id: Option<u8>,
    #[builder(default)]
    pub lat: f64,
    #[builder(default)]
    pub lon: f64,
    /// km/h
    #[builder(default)]
    pub speed: f64,
    pub stop_sequence: u32,
    #[builder(default, setter(strip_option))]
    pub stop_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub vehicle_id: Option<String>,
    #[builder(default = "VehicleStopStatus::InTransitTo")]
    pub vehicle_status: VehicleStopStatus,
    pub observed_at: DateTime<Utc>,
}

/// Observations for one service date, grouped by trip id
pub type ObservationIndex = HashMap<String, Vec<VehicleObservation>>;

impl TryFrom<vehicle_updates::Model> for VehicleObservation {
    type Error = DbError;

    fn try_from(m: vehicle_updates::Model) -> Result<Self, Self::Error> {
        let service_date = parse_gtfs_date(&m.start_date)
            .map_err(|e| DbError::InvalidValue(e.to_string()))?;
        let stop_sequence = u32::try_from(m.stop_sequence)
            .map_err(|_| DbError::InvalidValue(format!("Stop sequence {}", m.stop_sequence)))?;
        let observed_at = DateTime::<Utc>::from_timestamp(m.observed_at, 0)
            .ok_or_else(|| DbError::InvalidValue(format!("Timestamp {}", m.observed_at)))?;

        Ok(VehicleObservation {
            service_date,
            trip_id: m.trip_id,
            route_id: m.route_id,
            direction_id: m.direction_id.and_then(|d| u8::try_from(d).ok()),
            lat: m.lat,
            lon: m.lon,
            speed: m.speed,
            stop_sequence,
            stop_id: m.stop_id,
            vehicle_id: m.vehicle_id,
            vehicle_status: m.vehicle_status.try_into()?,
            observed_at,
        })
    }
}

/// Inserts the observation, or replaces position, status and time
/// of the existing row for the same (service date, trip, stop sequence)
pub async fn upsert_observation(
    db: &impl ConnectionTrait,
    observation: &VehicleObservation,
) -> DbResult<()> {
    use vehicle_updates::Column;

    let model = vehicle_updates::ActiveModel {
        id: NotSet,
        start_date: Set(format_gtfs_date(&observation.service_date)),
        trip_id: Set(observation.trip_id.clone()),
        route_id: Set(observation.route_id.clone()),
        direction_id: Set(observation.direction_id.map(|d| d as i32)),
        lat: Set(observation.lat),
        lon: Set(observation.lon),
        speed: Set(observation.speed),
        stop_sequence: Set(observation.stop_sequence as i32),
        stop_id: Set(observation.stop_id.clone()),
        vehicle_id: Set(observation.vehicle_id.clone()),
        vehicle_status: Set(observation.vehicle_status as i32),
        observed_at: Set(observation.observed_at.timestamp()),
    };

    VehicleUpdates::insert(model)
        .on_conflict(
            OnConflict::columns([Column::StartDate, Column::TripId, Column::StopSequence])
                .update_columns([
                    Column::Lat,
                    Column::Lon,
                    Column::Speed,
                    Column::VehicleStatus,
                    Column::ObservedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(())
}

/// Point-in-time snapshot of everything observed for a service date
pub async fn observations_for_date(
    db: &impl ConnectionTrait,
    service_date: &NaiveDate,
) -> DbResult<ObservationIndex> {
    let rows = VehicleUpdates::find()
        .filter(vehicle_updates::Column::StartDate.eq(format_gtfs_date(service_date)))
        .all(db)
        .await?;

    let mut index = ObservationIndex::new();
    for row in rows {
        match VehicleObservation::try_from(row) {
            Ok(observation) => index
                .entry(observation.trip_id.clone())
                .or_default()
                .push(observation),
            Err(e) => log::warn!("Skipping stored observation: {}", e),
        }
    }

    Ok(index)
}

/// Deletes observations for service dates before `cutoff`
pub async fn purge_observations_before(
    db: &impl ConnectionTrait,
    cutoff: &NaiveDate,
) -> DbResult<u64> {
    let result = VehicleUpdates::delete_many()
        .filter(vehicle_updates::Column::StartDate.lt(format_gtfs_date(cutoff)))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
