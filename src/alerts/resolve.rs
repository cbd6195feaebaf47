use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;

use super::recognize::{candidates, recognize, NamedEntities};
use super::track::Alert;
use crate::gtfs::structure::Trip;
use crate::gtfs::utils::service_day_naive;

/// An alert with every local date-time its text could refer to
#[derive(Debug, Clone)]
pub struct RecognizedAlert {
    pub alert: Alert,
    pub entities: NamedEntities,
    pub candidates: Vec<NaiveDateTime>,
}

impl RecognizedAlert {
    /// Years are inferred against the local date the alert was first seen
    pub fn new(alert: Alert, timezone: &Tz) -> Self {
        let reference = alert.first_seen.with_timezone(timezone).date_naive();
        let entities = recognize(&alert.title);
        let candidates = candidates(&entities, &reference);
        Self {
            alert,
            entities,
            candidates,
        }
    }
}

/// Trips named by an alert's route and exact departure time on the service date
pub fn link_alerts_to_trips(
    trips_by_route: &BTreeMap<String, Vec<&Trip>>,
    service_date: &NaiveDate,
    recognized: &[RecognizedAlert],
) -> BTreeSet<String> {
    let mut cancelled = BTreeSet::new();

    for alert in recognized {
        let Some(trips) = trips_by_route.get(&alert.alert.route_id) else {
            continue;
        };

        for candidate in &alert.candidates {
            if candidate.date() != *service_date {
                continue;
            }
            for trip in trips {
                if service_day_naive(service_date, trip.first_departure()) == *candidate {
                    log::debug!(
                        "Alert {} cancels {} ({})",
                        alert.alert.alert_id,
                        trip.trip_id,
                        trip
                    );
                    cancelled.insert(trip.trip_id.clone());
                }
            }
        }
    }

    cancelled
}
