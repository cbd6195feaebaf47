use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use tempfile::TempDir;

use crate::config::Config;
use crate::db::util::open_seaorm;
use crate::feed::FeedClient;
use crate::gtfs::schedule::Schedule;
use crate::gtfs::structure::{Route, StopTime, Trip, TripHeader};
use crate::observations::{VehicleObservation, VehicleObservationBuilder, VehicleStopStatus};

pub fn init() {
    dotenvy::from_filename(".dev.vars").ok();
    env_logger::try_init().ok();
}

/// A migrated database in a temporary directory. Keep the dir alive for the test.
pub async fn db() -> (TempDir, DatabaseConnection) {
    init();
    let dir = tempfile::tempdir().unwrap();
    let db = open_seaorm(&db_path(&dir)).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    (dir, db)
}

/// Context over a fresh database, with feeds that are never fetched
pub async fn ctx() -> (TempDir, crate::ContextData) {
    let (dir, db) = db().await;
    let config = Config {
        database_path: db_path(&dir),
        listen_address: "127.0.0.1:0".to_string(),
        allow_origin: None,
        gtfs_url: "http://localhost/gtfs.zip".to_string(),
        vehicle_positions_url: "http://localhost/vehiclepositions.json".to_string(),
        alerts_url: "http://localhost/alerts".to_string(),
        timezone: None,
        vehicle_poll_seconds: 20,
        alert_poll_seconds: 1800,
        maintenance_minute: 240,
        retention_days: 14,
    };
    let client = FeedClient::new(&config.vehicle_positions_url, &config.alerts_url).unwrap();
    let ctx = crate::ContextData {
        client,
        db,
        schedule: Arc::new(tokio::sync::RwLock::new(Arc::new(Schedule::empty(chrono_tz::UTC)))),
        config: Arc::new(config),
    };
    (dir, ctx)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// UTC instant at an offset from the service date's midnight
pub fn at(service_date: NaiveDate, offset_secs: i64) -> DateTime<Utc> {
    service_date.and_hms_opt(0, 0, 0).unwrap().and_utc() + Duration::seconds(offset_secs)
}

pub fn route(short_name: &str) -> Arc<Route> {
    Arc::new(Route {
        route_id: short_name.to_string(),
        route_short_name: short_name.to_string(),
        route_long_name: None,
        route_color: Some("003DA5".to_string()),
        route_text_color: Some("FFFFFF".to_string()),
    })
}

pub fn stop_time(trip_id: &str, stop_id: &str, stop_sequence: u32, offset: u32) -> StopTime {
    StopTime {
        trip_id: trip_id.to_string(),
        stop_id: stop_id.to_string(),
        stop_sequence,
        arrival_time: offset,
        departure_time: offset,
        stop_headsign: None,
        pickup_type: None,
        drop_off_type: None,
        timepoint: None,
    }
}

/// A weekday trip calling at `stops`, each given as (stop id, minutes after `start`).
/// Stop sequences are 1-based positions.
pub fn trip(
    trip_id: &str,
    route_short_name: &str,
    block_id: Option<&str>,
    start: u32,
    stops: &[(&str, u32)],
) -> Trip {
    let header = TripHeader {
        trip_id: trip_id.to_string(),
        route: route(route_short_name),
        direction_id: 0,
        service_id: "WK".to_string(),
        block_id: block_id.map(str::to_string),
        trip_headsign: Some("Downtown".to_string()),
    };
    let stop_times = stops
        .iter()
        .enumerate()
        .map(|(i, (stop_id, minutes))| {
            stop_time(trip_id, stop_id, i as u32 + 1, start + minutes * 60)
        })
        .collect();
    Trip::new(header, stop_times).unwrap()
}

pub fn observation(
    service_date: NaiveDate,
    trip_id: &str,
    stop_sequence: u32,
    vehicle_status: VehicleStopStatus,
    observed_at: i64,
) -> VehicleObservation {
    VehicleObservationBuilder::default()
        .service_date(service_date)
        .trip_id(trip_id)
        .route_id("72")
        .direction_id(0u8)
        .lat(48.43)
        .lon(-123.37)
        .speed(25.2)
        .stop_sequence(stop_sequence)
        .vehicle_id("9001")
        .vehicle_status(vehicle_status)
        .observed_at(DateTime::<Utc>::from_timestamp(observed_at, 0).unwrap())
        .build()
        .unwrap()
}

pub fn db_path(dir: &TempDir) -> String {
    dir.path().join("test.db").to_str().unwrap().to_string()
}
