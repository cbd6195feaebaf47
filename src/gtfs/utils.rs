use std::fmt::Display;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;

#[derive(thiserror::Error, Debug, PartialEq)]
pub struct DateError(String);

impl Display for DateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DateError: {}", self.0)
    }
}

pub type DateResult<T> = Result<T, DateError>;

/// GTFS dates are `YYYYMMDD`
pub fn parse_gtfs_date(date: &str) -> DateResult<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y%m%d").map_err(|e| DateError(e.to_string()))
}

pub fn format_gtfs_date(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parses GTFS `H:MM:SS` times into seconds since service-date midnight.
/// Accomodates times past 24 hours.
pub struct GtfsTimeParser {
    re_time: Regex,
}

impl GtfsTimeParser {
    pub fn new() -> Self {
        // It's important this is compiled once, it's by far the most expensive part
        let re_time = Regex::new(r"^\s*(\d{1,3}):(\d{2}):(\d{2})\s*$").unwrap();
        Self { re_time }
    }

    pub fn parse_offset(&self, time: &str) -> DateResult<u32> {
        let captures = self
            .re_time
            .captures(time)
            .ok_or_else(|| DateError(format!("Invalid time: {}", time)))?;

        let field = |i: usize| -> DateResult<u32> {
            captures[i]
                .parse::<u32>()
                .map_err(|e| DateError(e.to_string()))
        };
        let (hour, minute, second) = (field(1)?, field(2)?, field(3)?);

        if minute > 59 || second > 59 {
            return Err(DateError(format!("Invalid time: {}", time)));
        }

        Ok(hour * 3600 + minute * 60 + second)
    }
}

impl Default for GtfsTimeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Origin of stop time offsets on a service date: local noon minus 12h.
/// On DST change days this is not local midnight.
pub fn service_day_start(date: &NaiveDate, tz: &Tz) -> DateResult<DateTime<Tz>> {
    let noon = date
        .and_hms_opt(12, 0, 0)
        .ok_or_else(|| DateError("Invalid noon".to_string()))?;
    let local_noon = tz
        .from_local_datetime(&noon)
        .earliest()
        .ok_or_else(|| DateError(format!("No local noon on {} in {}", date, tz)))?;
    Ok(local_noon - Duration::hours(12))
}

/// The naive local date-time of a service-date offset, e.g. 25:10:00 lands on the next day
pub fn service_day_naive(date: &NaiveDate, offset_secs: u32) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN) + Duration::seconds(offset_secs as i64)
}
