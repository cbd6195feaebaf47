use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use itertools::Itertools;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Meridiem {
    Am,
    Pm,
    Ambiguous,
}

/// A clock time as written in the alert, before meridiem expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NamedTime {
    pub hour: u32,
    pub minute: u32,
    pub meridiem: Meridiem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrdinalSuffix {
    St,
    Nd,
    Rd,
    Th,
    Ambiguous,
}

/// A month and day as written in the alert, the year is inferred later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NamedDate {
    pub month: u32,
    pub day: u32,
    pub ordinal: OrdinalSuffix,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamedEntities {
    pub times: Vec<NamedTime>,
    pub dates: Vec<NamedDate>,
}

pub struct Recognizer {
    re_time: Regex,
    re_date: Regex,
}

impl Recognizer {
    pub fn new() -> Self {
        let re_time = Regex::new(r"(\d:?\d:?\d\d?) *((?i:am|pm))?").unwrap();
        let re_date = Regex::new(
            r"(Jan|January|Feb|February|Mar|March|Apr|April|May|Jun|June|Jul|July|Aug|August|Sep|Sept|September|Oct|October|Nov|November|Dec|December) *(\d\d?) *(st|nd|rd|th)?\b",
        )
        .unwrap();
        Self { re_time, re_date }
    }

    pub fn recognize(&self, text: &str) -> NamedEntities {
        NamedEntities {
            times: self.extract_times(text),
            dates: self.extract_dates(text),
        }
    }

    fn extract_times(&self, text: &str) -> Vec<NamedTime> {
        self.re_time
            .captures_iter(text)
            .filter_map(|c| {
                let digits = c[1].replace(':', "");
                let (hour, minute) = digits.split_at(digits.len() - 2);
                let meridiem = match c.get(2).map(|m| m.as_str().to_lowercase()) {
                    Some(m) if m == "am" => Meridiem::Am,
                    Some(_) => Meridiem::Pm,
                    None => Meridiem::Ambiguous,
                };
                Some(NamedTime {
                    hour: hour.parse().ok()?,
                    minute: minute.parse().ok()?,
                    meridiem,
                })
            })
            .collect()
    }

    fn extract_dates(&self, text: &str) -> Vec<NamedDate> {
        self.re_date
            .captures_iter(text)
            .filter_map(|c| {
                let Some(month) = month_number(&c[1]) else {
                    log::debug!("Unknown month {}", &c[1]);
                    return None;
                };
                let ordinal = match c.get(3).map(|m| m.as_str()) {
                    Some("st") => OrdinalSuffix::St,
                    Some("nd") => OrdinalSuffix::Nd,
                    Some("rd") => OrdinalSuffix::Rd,
                    Some("th") => OrdinalSuffix::Th,
                    _ => OrdinalSuffix::Ambiguous,
                };
                Some(NamedDate {
                    month,
                    day: c[2].parse().ok()?,
                    ordinal,
                })
            })
            .collect()
    }
}

impl Default for Recognizer {
    fn default() -> Self {
        Self::new()
    }
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_uppercase();
    let month = match prefix.as_str() {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(month)
}

/// Extracts the times and dates mentioned in free text
pub fn recognize(text: &str) -> NamedEntities {
    static RECOGNIZER: OnceLock<Recognizer> = OnceLock::new();
    RECOGNIZER.get_or_init(Recognizer::new).recognize(text)
}

/// Every clock time the written time could mean. Impossible times are dropped.
pub fn expand_time(time: &NamedTime) -> Vec<NaiveTime> {
    let am = || if time.hour == 12 { 0 } else { time.hour };
    let pm = || if time.hour == 12 { 12 } else { time.hour + 12 };

    let hours = match time.meridiem {
        Meridiem::Am => vec![am()],
        Meridiem::Pm => vec![pm()],
        Meridiem::Ambiguous => vec![am(), pm()],
    };

    hours
        .into_iter()
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, time.minute, 0))
        .collect()
}

/// Places each date in the reference year, or the next one when the month is
/// well behind the reference month. Dates that don't exist are dropped.
pub fn resolve_dates(dates: &[NamedDate], reference: &NaiveDate) -> Vec<NaiveDate> {
    dates
        .iter()
        .filter_map(|date| {
            let year = if (date.month as i32) < reference.month() as i32 - 1 {
                reference.year() + 1
            } else {
                reference.year()
            };
            NaiveDate::from_ymd_opt(year, date.month, date.day)
        })
        .collect()
}

/// All (date, time) combinations mentioned by the entities
pub fn candidates(entities: &NamedEntities, reference: &NaiveDate) -> Vec<NaiveDateTime> {
    let dates = resolve_dates(&entities.dates, reference);
    let times = entities.times.iter().flat_map(expand_time).collect_vec();

    dates
        .iter()
        .cartesian_product(times.iter())
        .map(|(date, time)| date.and_time(*time))
        .collect()
}
