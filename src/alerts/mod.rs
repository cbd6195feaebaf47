//! Service alerts: tracking the alert feed, reading times and dates out of
//! the free text, and matching those to the scheduled trips they cancel.

pub mod recognize;
pub mod resolve;
pub mod track;

pub use resolve::{link_alerts_to_trips, RecognizedAlert};
pub use track::{track_alerts, Alert};
