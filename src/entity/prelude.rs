#![allow(unused_imports)]

pub use super::alerts::Entity as Alerts;
pub use super::gtfs_agency::Entity as GtfsAgency;
pub use super::gtfs_calendar::Entity as GtfsCalendar;
pub use super::gtfs_calendar_dates::Entity as GtfsCalendarDates;
pub use super::gtfs_routes::Entity as GtfsRoutes;
pub use super::gtfs_stop_times::Entity as GtfsStopTimes;
pub use super::gtfs_trips::Entity as GtfsTrips;
pub use super::import::Entity as Import;
pub use super::vehicle_updates::Entity as VehicleUpdates;
