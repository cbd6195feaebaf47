pub mod calendar;
pub mod itinerary;
pub mod realtime;
pub mod schedule;
pub mod structure;
pub mod sync;
pub mod utils;
