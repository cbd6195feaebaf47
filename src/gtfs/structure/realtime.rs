// The vehicle position subset of gtfs-realtime.proto. Feeds are served either
// JSON-encoded or as protobuf, which is converted into these same types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::serde_helpers::{
    deserialize_option_loose_u32, deserialize_option_stop_status, deserialize_option_unix_date,
    deserialize_skipping_invalid,
};
use crate::observations::VehicleStopStatus;

/// The contents of a feed message.
/// Each message is obtained as a response to an HTTP GET request.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct FeedMessage {
    pub header: FeedHeader,
    #[serde(default, deserialize_with = "deserialize_skipping_invalid")]
    pub entity: Vec<FeedEntity>,
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct FeedHeader {
    pub gtfs_realtime_version: String,
    /// When the content of this feed was created, in server time
    #[serde(default, deserialize_with = "deserialize_option_unix_date")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Only vehicle positions are read, trip updates and alerts in the same feed are ignored
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct FeedEntity {
    pub id: String,
    pub is_deleted: Option<bool>,
    pub vehicle: Option<VehiclePosition>,
}

/// Realtime positioning information for a given vehicle.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct VehiclePosition {
    /// Can be empty or partial if the vehicle can not be matched to a trip
    pub trip: Option<TripDescriptor>,
    pub vehicle: Option<VehicleDescriptor>,
    pub position: Option<Position>,
    /// Its meaning is determined by current_status
    pub current_stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    /// If missing IN_TRANSIT_TO is assumed
    #[serde(default, deserialize_with = "deserialize_option_stop_status")]
    pub current_status: Option<VehicleStopStatus>,
    /// Moment at which the vehicle's position was measured
    #[serde(default, deserialize_with = "deserialize_option_unix_date")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct Position {
    pub latitude: f32,
    pub longitude: f32,
    /// Metres per second
    pub speed: Option<f32>,
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct TripDescriptor {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_loose_u32")]
    pub direction_id: Option<u32>,
    pub start_time: Option<String>,
    /// YYYYMMDD
    pub start_date: Option<String>,
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct VehicleDescriptor {
    /// Internal system identification of the vehicle
    pub id: Option<String>,
    /// User visible label
    pub label: Option<String>,
    pub license_plate: Option<String>,
}

fn proto_timestamp(secs: Option<u64>) -> Option<DateTime<Utc>> {
    secs.and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
}

impl From<gtfs_realtime::FeedMessage> for FeedMessage {
    fn from(message: gtfs_realtime::FeedMessage) -> Self {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: message.header.gtfs_realtime_version,
                timestamp: proto_timestamp(message.header.timestamp),
            },
            entity: message.entity.into_iter().map(FeedEntity::from).collect(),
        }
    }
}

impl From<gtfs_realtime::FeedEntity> for FeedEntity {
    fn from(entity: gtfs_realtime::FeedEntity) -> Self {
        let vehicle = entity.vehicle.and_then(|vehicle| {
            let current_status = match vehicle.current_status {
                None => None,
                Some(code) => match VehicleStopStatus::try_from(code) {
                    Ok(status) => Some(status),
                    Err(e) => {
                        log::warn!("Skipping vehicle in entity {}: {}", entity.id, e);
                        return None;
                    }
                },
            };

            Some(VehiclePosition {
                trip: vehicle.trip.map(|trip| TripDescriptor {
                    trip_id: trip.trip_id,
                    route_id: trip.route_id,
                    direction_id: trip.direction_id,
                    start_time: trip.start_time,
                    start_date: trip.start_date,
                }),
                vehicle: vehicle.vehicle.map(|descriptor| VehicleDescriptor {
                    id: descriptor.id,
                    label: descriptor.label,
                    license_plate: descriptor.license_plate,
                }),
                position: vehicle.position.map(|position| Position {
                    latitude: position.latitude,
                    longitude: position.longitude,
                    speed: position.speed,
                }),
                current_stop_sequence: vehicle.current_stop_sequence,
                stop_id: vehicle.stop_id,
                current_status,
                timestamp: proto_timestamp(vehicle.timestamp),
            })
        });

        FeedEntity {
            id: entity.id,
            is_deleted: entity.is_deleted,
            vehicle,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deserialize_vehicle_feed() {
        let json = r#"{
            "header": {"gtfs_realtime_version": "2.0", "timestamp": 1709478000},
            "entity": [
                {
                    "id": "v1",
                    "vehicle": {
                        "trip": {"trip_id": "t1", "route_id": "72", "direction_id": "1", "start_date": "20240303"},
                        "vehicle": {"id": "9001", "label": "9001"},
                        "position": {"latitude": 48.42, "longitude": -123.36, "speed": 10.0},
                        "current_stop_sequence": 4,
                        "stop_id": "100",
                        "current_status": 1,
                        "timestamp": 1709478010.0
                    }
                },
                {"id": "a1", "alert": {"header_text": "ignored"}}
            ]
        }"#;

        let feed: FeedMessage = serde_json::from_str(json).unwrap();
        assert_eq!(feed.entity.len(), 2);
        assert!(feed.entity[1].vehicle.is_none());

        let vehicle = feed.entity[0].vehicle.as_ref().unwrap();
        let trip = vehicle.trip.as_ref().unwrap();
        assert_eq!(trip.direction_id, Some(1));
        assert_eq!(vehicle.current_status, Some(VehicleStopStatus::StoppedAt));
        assert_eq!(vehicle.current_stop_sequence, Some(4));
        assert_eq!(
            vehicle.timestamp,
            DateTime::<Utc>::from_timestamp(1709478010, 0)
        );
    }

    #[test]
    fn test_status_names_and_bad_entities() {
        let json = r#"{
            "header": {"gtfs_realtime_version": "2.0"},
            "entity": [
                {"id": "v1", "vehicle": {"trip": {"trip_id": "t1"}, "current_status": "STOPPED_AT"}},
                {"id": "v2", "vehicle": {"trip": {"trip_id": "t2"}, "current_status": "PARKED"}},
                {"id": "v3", "vehicle": {"trip": {"trip_id": "t3"}, "current_status": 0}}
            ]
        }"#;

        let feed: FeedMessage = serde_json::from_str(json).unwrap();
        let ids = feed.entity.iter().map(|e| e.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["v1", "v3"]);
        let statuses = feed
            .entity
            .iter()
            .map(|e| e.vehicle.as_ref().unwrap().current_status)
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            [Some(VehicleStopStatus::StoppedAt), Some(VehicleStopStatus::IncomingAt)]
        );
    }

    #[test]
    fn test_from_protobuf() {
        let message = gtfs_realtime::FeedMessage {
            header: gtfs_realtime::FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1709478000),
                ..Default::default()
            },
            entity: vec![
                gtfs_realtime::FeedEntity {
                    id: "v1".to_string(),
                    vehicle: Some(gtfs_realtime::VehiclePosition {
                        trip: Some(gtfs_realtime::TripDescriptor {
                            trip_id: Some("t1".to_string()),
                            direction_id: Some(1),
                            start_date: Some("20240303".to_string()),
                            ..Default::default()
                        }),
                        current_stop_sequence: Some(4),
                        current_status: Some(1),
                        timestamp: Some(1709478010),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                gtfs_realtime::FeedEntity {
                    id: "v2".to_string(),
                    vehicle: Some(gtfs_realtime::VehiclePosition {
                        current_status: Some(9),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
        };

        let feed = FeedMessage::from(message);
        assert_eq!(feed.header.timestamp, DateTime::<Utc>::from_timestamp(1709478000, 0));
        let vehicle = feed.entity[0].vehicle.as_ref().unwrap();
        assert_eq!(vehicle.current_status, Some(VehicleStopStatus::StoppedAt));
        assert_eq!(vehicle.trip.as_ref().unwrap().direction_id, Some(1));
        assert_eq!(vehicle.timestamp, DateTime::<Utc>::from_timestamp(1709478010, 0));
        assert!(feed.entity[1].vehicle.is_none());
    }
}
