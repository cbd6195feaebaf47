use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use chrono_tz::Tz;
use sea_orm::sea_query::{Expr, Query};

use super::calendar::{CalendarRule, Exception, ServiceCalendar};
use super::structure::{Route, StopTime, Trip, TripHeader};
use super::utils::{parse_gtfs_date, DateError, GtfsTimeParser};
use crate::db::util::{open_rusqlite, SeaRusqliteAdapter};
use crate::entity::{
    gtfs_agency, gtfs_calendar, gtfs_calendar_dates, gtfs_routes, gtfs_stop_times, gtfs_trips,
};

#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Error parsing date: {0}")]
    Date(#[from] DateError),

    #[error("Invalid timezone: {0}")]
    Timezone(String),

    #[error("Schedule load task failed: {0}")]
    Task(String),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// The static schedule for the lifetime of one import. Read-only once loaded.
#[derive(Debug)]
pub struct Schedule {
    pub timezone: Tz,
    pub calendar: ServiceCalendar,
    pub routes: BTreeMap<String, Arc<Route>>,
    pub trips: BTreeMap<String, Trip>,
}

impl Schedule {
    pub fn empty(timezone: Tz) -> Self {
        Self {
            timezone,
            calendar: ServiceCalendar::new(),
            routes: BTreeMap::new(),
            trips: BTreeMap::new(),
        }
    }

    pub fn from_trips(timezone: Tz, calendar: ServiceCalendar, trips: Vec<Trip>) -> Self {
        let routes = trips
            .iter()
            .map(|t| (t.route.route_id.clone(), t.route.clone()))
            .collect();
        let trips = trips.into_iter().map(|t| (t.trip_id.clone(), t)).collect();
        Self {
            timezone,
            calendar,
            routes,
            trips,
        }
    }

    /// Trips whose service runs on the date, in trip id order
    pub fn active_trips(&self, service_date: &NaiveDate) -> Vec<&Trip> {
        let active_services = self.calendar.active_services(service_date);
        self.trips
            .values()
            .filter(|trip| active_services.contains(&trip.service_id))
            .collect()
    }
}

/// Groups trips by route id
pub fn trips_by_route<'a>(trips: &[&'a Trip]) -> BTreeMap<String, Vec<&'a Trip>> {
    let mut by_route = BTreeMap::<String, Vec<&Trip>>::new();
    for trip in trips {
        by_route
            .entry(trip.route.route_id.clone())
            .or_default()
            .push(*trip);
    }
    by_route
}

struct CountLogger {
    count: usize,
    last_time: Instant,
    name: &'static str,
}

impl CountLogger {
    fn new(name: &'static str) -> Self {
        Self {
            count: 0,
            last_time: Instant::now(),
            name,
        }
    }

    fn log(&mut self) {
        self.count += 1;
        if self.count % 500_000 == 0 {
            log::info!(
                "Loaded {} {} ({} ms)",
                self.count,
                self.name,
                self.last_time.elapsed().as_millis()
            );
            self.last_time = Instant::now();
        }
    }
}

fn load_timezone(db: &rusqlite::Connection, tz_override: Option<Tz>) -> ScheduleResult<Tz> {
    if let Some(tz) = tz_override {
        return Ok(tz);
    }

    let mut query = Query::select()
        .column(gtfs_agency::Column::AgencyTimezone)
        .from(gtfs_agency::Entity)
        .and_where(Expr::col(gtfs_agency::Column::AgencyTimezone).is_not_null())
        .limit(1)
        .to_owned()
        .prepare(db)?;

    let timezone: Option<String> = match query.query_row(|r| r.get(0)) {
        Ok(tz) => Some(tz),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(e.into()),
    };

    match timezone {
        Some(tz) => tz
            .parse()
            .map_err(|_| ScheduleError::Timezone(tz.to_string())),
        None => {
            log::warn!("No agency timezone, assuming UTC");
            Ok(Tz::UTC)
        }
    }
}

fn load_calendar(db: &rusqlite::Connection) -> ScheduleResult<ServiceCalendar> {
    use gtfs_calendar::Column as c;
    use gtfs_calendar_dates::Column as cd;

    let mut calendar = ServiceCalendar::new();

    let mut rules_query = Query::select()
        .columns([
            c::ServiceId,
            c::Monday,
            c::Tuesday,
            c::Wednesday,
            c::Thursday,
            c::Friday,
            c::Saturday,
            c::Sunday,
            c::StartDate,
            c::EndDate,
        ])
        .from(gtfs_calendar::Entity)
        .to_owned()
        .prepare(db)?;
    let mut rows = rules_query.query()?;

    while let Some(r) = rows.next()? {
        let service_id: String = r.get(0)?;
        let mut weekdays = [false; 7];
        for (i, day) in weekdays.iter_mut().enumerate() {
            *day = r.get::<_, Option<i32>>(i + 1)? == Some(1);
        }
        let start_date: Option<String> = r.get(8)?;
        let end_date: Option<String> = r.get(9)?;

        let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
            log::warn!("Calendar {} has no date range, skipping", service_id);
            continue;
        };
        match (parse_gtfs_date(&start_date), parse_gtfs_date(&end_date)) {
            (Ok(start_date), Ok(end_date)) => calendar.add_rule(CalendarRule {
                service_id,
                weekdays,
                start_date,
                end_date,
            }),
            _ => log::warn!("Calendar {} has invalid dates, skipping", service_id),
        }
    }

    let mut exceptions_query = Query::select()
        .columns([cd::ServiceId, cd::Date, cd::ExceptionType])
        .from(gtfs_calendar_dates::Entity)
        .to_owned()
        .prepare(db)?;
    let mut rows = exceptions_query.query()?;

    while let Some(r) = rows.next()? {
        let service_id: String = r.get(0)?;
        let date: String = r.get(1)?;
        let exception_type: Option<i32> = r.get(2)?;

        match (
            parse_gtfs_date(&date),
            exception_type.and_then(Exception::from_gtfs),
        ) {
            (Ok(date), Some(exception)) => calendar.add_exception(&service_id, date, exception),
            _ => log::warn!(
                "Invalid calendar date {} {} {:?}, skipping",
                service_id,
                date,
                exception_type
            ),
        }
    }

    Ok(calendar)
}

fn load_routes(db: &rusqlite::Connection) -> ScheduleResult<BTreeMap<String, Arc<Route>>> {
    use gtfs_routes::Column as r;

    let mut query = Query::select()
        .columns([
            r::RouteId,
            r::RouteShortName,
            r::RouteLongName,
            r::RouteColor,
            r::RouteTextColor,
        ])
        .from(gtfs_routes::Entity)
        .to_owned()
        .prepare(db)?;
    let mut rows = query.query()?;

    let mut routes = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let route_id: String = row.get(0)?;
        let route_short_name: Option<String> = row.get(1)?;
        let route = Route {
            route_short_name: route_short_name.unwrap_or_else(|| route_id.clone()),
            route_id: route_id.clone(),
            route_long_name: row.get(2)?,
            route_color: row.get(3)?,
            route_text_color: row.get(4)?,
        };
        routes.insert(route_id, Arc::new(route));
    }

    Ok(routes)
}

fn load_stop_times(
    db: &rusqlite::Connection,
) -> ScheduleResult<HashMap<String, Vec<StopTime>>> {
    use gtfs_stop_times::Column as st;

    let parser = GtfsTimeParser::new();
    let mut count = CountLogger::new("stop times");

    let mut query = Query::select()
        .columns([
            st::TripId,
            st::StopId,
            st::StopSequence,
            st::ArrivalTime,
            st::DepartureTime,
            st::StopHeadsign,
            st::PickupType,
            st::DropOffType,
            st::Timepoint,
        ])
        .from(gtfs_stop_times::Entity)
        .to_owned()
        .prepare(db)?;
    let mut rows = query.query()?;

    let mut stop_times = HashMap::<String, Vec<StopTime>>::new();
    while let Some(r) = rows.next()? {
        let trip_id: String = r.get(0)?;
        let stop_sequence: i64 = r.get(2)?;
        let arrival_time: Option<String> = r.get(3)?;
        let departure_time: Option<String> = r.get(4)?;

        // Untimed stops would need interpolation, which the predictions don't do
        let times = match (arrival_time.as_deref(), departure_time.as_deref()) {
            (Some(a), Some(d)) => parser
                .parse_offset(a)
                .and_then(|a| Ok((a, parser.parse_offset(d)?))),
            (Some(t), None) | (None, Some(t)) => parser.parse_offset(t).map(|t| (t, t)),
            (None, None) => {
                log::debug!("Untimed stop time {} #{}, skipping", trip_id, stop_sequence);
                continue;
            }
        };
        let (arrival_time, departure_time) = match times {
            Ok(times) => times,
            Err(e) => {
                log::warn!("Stop time {} #{}: {}, skipping", trip_id, stop_sequence, e);
                continue;
            }
        };
        let Ok(stop_sequence) = u32::try_from(stop_sequence) else {
            log::warn!("Stop time {} has negative sequence, skipping", trip_id);
            continue;
        };

        let stop_time = StopTime {
            trip_id: trip_id.clone(),
            stop_id: r.get(1)?,
            stop_sequence,
            arrival_time,
            departure_time,
            stop_headsign: r.get(5)?,
            pickup_type: r.get(6)?,
            drop_off_type: r.get(7)?,
            timepoint: r.get(8)?,
        };
        stop_times.entry(trip_id).or_default().push(stop_time);
        count.log();
    }

    Ok(stop_times)
}

fn load_trips(
    db: &rusqlite::Connection,
    routes: &BTreeMap<String, Arc<Route>>,
    mut stop_times: HashMap<String, Vec<StopTime>>,
) -> ScheduleResult<BTreeMap<String, Trip>> {
    use gtfs_trips::Column as t;

    let mut query = Query::select()
        .columns([
            t::TripId,
            t::RouteId,
            t::ServiceId,
            t::DirectionId,
            t::BlockId,
            t::TripHeadsign,
        ])
        .from(gtfs_trips::Entity)
        .to_owned()
        .prepare(db)?;
    let mut rows = query.query()?;

    let mut trips = BTreeMap::new();
    while let Some(r) = rows.next()? {
        let trip_id: String = r.get(0)?;
        let route_id: String = r.get(1)?;
        let direction_id: Option<i32> = r.get(3)?;

        let Some(route) = routes.get(&route_id) else {
            log::warn!("Trip {} references unknown route {}, skipping", trip_id, route_id);
            continue;
        };

        let header = TripHeader {
            trip_id: trip_id.clone(),
            route: route.clone(),
            direction_id: direction_id.unwrap_or(0).clamp(0, 1) as u8,
            service_id: r.get(2)?,
            block_id: r.get(4)?,
            trip_headsign: r.get(5)?,
        };

        match Trip::new(header, stop_times.remove(&trip_id).unwrap_or_default()) {
            Ok(trip) => {
                trips.insert(trip_id, trip);
            }
            Err(e) => log::warn!("{}, skipping", e),
        }
    }

    Ok(trips)
}

fn do_load_schedule(db_path: &str, tz_override: Option<Tz>) -> ScheduleResult<Schedule> {
    let db = open_rusqlite(db_path)?;

    let timezone = load_timezone(&db, tz_override)?;
    let calendar = load_calendar(&db)?;
    let routes = load_routes(&db)?;
    let stop_times = load_stop_times(&db)?;
    let trips = load_trips(&db, &routes, stop_times)?;

    log::info!(
        "Loaded schedule: {} routes, {} trips ({})",
        routes.len(),
        trips.len(),
        timezone
    );

    Ok(Schedule {
        timezone,
        calendar,
        routes,
        trips,
    })
}

pub async fn load_schedule(db_path: &str, tz_override: Option<Tz>) -> ScheduleResult<Schedule> {
    // Uses rusqlite directly in a background thread
    // This is much faster than going through the orm async layers
    let db_path = db_path.to_string();
    tokio::task::spawn_blocking(move || do_load_schedule(&db_path, tz_override))
        .await
        .map_err(|e| ScheduleError::Task(e.to_string()))?
}
