//! SeaORM entities, in the compact format produced by `sea-orm-cli generate entity`

pub mod prelude;

pub mod alerts;
pub mod gtfs_agency;
pub mod gtfs_calendar;
pub mod gtfs_calendar_dates;
pub mod gtfs_routes;
pub mod gtfs_stop_times;
pub mod gtfs_trips;
pub mod import;
pub mod vehicle_updates;
