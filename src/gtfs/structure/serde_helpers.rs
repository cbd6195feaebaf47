use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;

use crate::observations::VehicleStopStatus;

/// Feeds publish POSIX seconds, sometimes as floats
pub fn deserialize_option_unix_date<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let f_secs: Option<f64> = Deserialize::deserialize(deserializer)?;
    match f_secs {
        None => Ok(None),
        Some(secs) => {
            let secs = secs as i64;
            let dt = DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| serde::de::Error::custom("Invalid timestamp"))?;
            Ok(Some(dt))
        }
    }
}

/// Direction ids show up as numbers or as numeric strings depending on the producer
pub fn deserialize_option_loose_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Num(u32),
        Str(String),
    }

    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Loose::Num(n)) => Ok(Some(n)),
        Some(Loose::Str(s)) if s.is_empty() => Ok(None),
        Some(Loose::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Stop status as the proto enum number or its name, e.g. 1 or "STOPPED_AT"
pub fn deserialize_option_stop_status<'de, D>(
    deserializer: D,
) -> Result<Option<VehicleStopStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Status {
        Code(i32),
        Name(String),
    }

    match Option::<Status>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Status::Code(code)) => VehicleStopStatus::try_from(code)
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(Status::Name(name)) => match name.as_str() {
            "INCOMING_AT" => Ok(Some(VehicleStopStatus::IncomingAt)),
            "STOPPED_AT" => Ok(Some(VehicleStopStatus::StoppedAt)),
            "IN_TRANSIT_TO" => Ok(Some(VehicleStopStatus::InTransitTo)),
            other => Err(serde::de::Error::custom(format!(
                "Unknown vehicle stop status: {}",
                other
            ))),
        },
    }
}

/// A list where elements that fail to deserialize are dropped with a warning
/// instead of failing the whole document
pub fn deserialize_skipping_invalid<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values: Vec<serde_json::Value> = Deserialize::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("Skipping unreadable feed entity: {}", e);
                None
            }
        })
        .collect())
}
