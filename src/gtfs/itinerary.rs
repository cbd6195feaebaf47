use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use super::structure::{StopPatternCell, StopTime, Trip};

/// Identifies a distinct stop pattern of a route in one direction.
/// The counter starts at 1 and follows the order patterns were first seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItineraryKey {
    pub route_short_name: String,
    pub direction_id: u8,
    pub counter: u32,
}

impl fmt::Display for ItineraryKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.route_short_name, self.direction_id, self.counter
        )
    }
}

/// Position of a stop within an itinerary's stop pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopLocator {
    pub itinerary: ItineraryKey,
    pub offset: usize,
}

pub type Itineraries<'a> = BTreeMap<ItineraryKey, Vec<&'a Trip>>;
pub type StopIndex = BTreeMap<String, Vec<StopLocator>>;

pub fn build_itineraries<'a>(trips: &[&'a Trip]) -> Itineraries<'a> {
    let mut patterns = HashMap::<(String, u8, Vec<StopPatternCell>), ItineraryKey>::new();
    let mut counters = HashMap::<(String, u8), u32>::new();
    let mut itineraries = Itineraries::new();

    for trip in trips {
        let route_short_name = trip.route.route_short_name.clone();
        let pattern_key = (
            route_short_name.clone(),
            trip.direction_id,
            trip.stop_pattern(),
        );

        let key = patterns
            .entry(pattern_key)
            .or_insert_with(|| {
                let counter = counters
                    .entry((route_short_name.clone(), trip.direction_id))
                    .or_insert(0);
                *counter += 1;
                ItineraryKey {
                    route_short_name,
                    direction_id: trip.direction_id,
                    counter: *counter,
                }
            })
            .clone();

        itineraries.entry(key).or_default().push(*trip);
    }

    for trips in itineraries.values_mut() {
        trips.sort_by(|a, b| {
            a.first_departure()
                .cmp(&b.first_departure())
                .then_with(|| a.trip_id.cmp(&b.trip_id))
        });
    }

    itineraries
}

/// Every trip of an itinerary shares the stop pattern, so the first one stands in for all
pub fn stop_index(itineraries: &Itineraries) -> StopIndex {
    let mut index = StopIndex::new();
    for (key, trips) in itineraries {
        let Some(representative) = trips.first() else {
            continue;
        };
        for (offset, stop_time) in representative.stop_times().iter().enumerate() {
            index
                .entry(stop_time.stop_id.clone())
                .or_default()
                .push(StopLocator {
                    itinerary: key.clone(),
                    offset,
                });
        }
    }
    index
}

/// Itineraries of a day's trips plus the stop lookup over them
pub struct ItineraryIndex<'a> {
    pub itineraries: Itineraries<'a>,
    pub stops: StopIndex,
}

impl<'a> ItineraryIndex<'a> {
    pub fn new(trips: &[&'a Trip]) -> Self {
        let itineraries = build_itineraries(trips);
        let stops = stop_index(&itineraries);
        Self { itineraries, stops }
    }

    /// Scheduled calls at a stop for one route and direction, ordered by departure
    pub fn departures_at(
        &self,
        route_short_name: &str,
        direction_id: u8,
        stop_id: &str,
    ) -> Vec<(&'a Trip, &'a StopTime)> {
        let mut departures = vec![];

        for locator in self.stops.get(stop_id).into_iter().flatten() {
            let key = &locator.itinerary;
            if key.route_short_name != route_short_name || key.direction_id != direction_id {
                continue;
            }
            for trip in self.itineraries.get(key).into_iter().flatten() {
                let trip: &'a Trip = *trip;
                if let Some(stop_time) = trip.stop_times().get(locator.offset) {
                    departures.push((trip, stop_time));
                }
            }
        }

        departures.sort_by(|(ta, sa), (tb, sb)| {
            sa.departure_time
                .cmp(&sb.departure_time)
                .then_with(|| ta.trip_id.cmp(&tb.trip_id))
        });
        departures
    }
}
