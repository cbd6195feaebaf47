use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::predict::{Predictions, TripPrediction};

/// A scheduled call at a stop, with what is believed about its trip
#[derive(Debug, Serialize, Clone)]
pub struct StopDeparture {
    pub stop_id: String,
    pub stop_sequence: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_headsign: Option<String>,
    #[serde(serialize_with = "to_iso_datetime")]
    pub scheduled_departure: NaiveDateTime,
    pub departure_timestamp: i64,
    pub trip: TripPrediction,
}

/// Response of the blocks endpoint
#[derive(Debug, Serialize)]
pub struct BlocksResponse {
    pub service_date: String,
    pub evaluated_at: i64,
    pub blocks: BTreeMap<String, BTreeMap<String, TripPrediction>>,
}

impl From<&Predictions> for BlocksResponse {
    fn from(predictions: &Predictions) -> Self {
        BlocksResponse {
            service_date: crate::gtfs::utils::format_gtfs_date(&predictions.service_date),
            evaluated_at: predictions.evaluated_at.timestamp(),
            blocks: predictions.blocks(),
        }
    }
}

fn to_iso_datetime<S>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&time.format("%Y-%m-%dT%H:%M:%S").to_string())
}
