use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, Weekday};

/// A weekly service pattern from calendar.txt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarRule {
    pub service_id: String,
    /// Monday first
    pub weekdays: [bool; 7],
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CalendarRule {
    /// Returns true if the weekly rule covers that day
    pub fn covers(&self, date: &NaiveDate) -> bool {
        let runs_on_weekday = match date.weekday() {
            Weekday::Mon => self.weekdays[0],
            Weekday::Tue => self.weekdays[1],
            Weekday::Wed => self.weekdays[2],
            Weekday::Thu => self.weekdays[3],
            Weekday::Fri => self.weekdays[4],
            Weekday::Sat => self.weekdays[5],
            Weekday::Sun => self.weekdays[6],
        };
        runs_on_weekday && self.start_date <= *date && *date <= self.end_date
    }
}

/// calendar_dates.txt exception_type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Added,
    Removed,
}

impl Exception {
    pub fn from_gtfs(exception_type: i32) -> Option<Exception> {
        match exception_type {
            1 => Some(Exception::Added),
            2 => Some(Exception::Removed),
            _ => None,
        }
    }
}

/// Resolves which services run on a given service date
#[derive(Debug, Clone, Default)]
pub struct ServiceCalendar {
    rules: BTreeMap<String, CalendarRule>,
    exceptions: BTreeMap<NaiveDate, BTreeMap<String, Exception>>,
}

impl ServiceCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: CalendarRule) {
        self.rules.insert(rule.service_id.clone(), rule);
    }

    pub fn add_exception(&mut self, service_id: &str, date: NaiveDate, exception: Exception) {
        self.exceptions
            .entry(date)
            .or_default()
            .insert(service_id.to_string(), exception);
    }

    pub fn active_services(&self, date: &NaiveDate) -> BTreeSet<String> {
        let exceptions = self.exceptions.get(date);
        let exception_for =
            |service_id: &str| exceptions.and_then(|e| e.get(service_id)).copied();

        // Regular services, except those removed for this date
        let mut active: BTreeSet<String> = self
            .rules
            .values()
            .filter(|rule| rule.covers(date))
            .filter(|rule| exception_for(&rule.service_id) != Some(Exception::Removed))
            .map(|rule| rule.service_id.clone())
            .collect();

        // Added services
        if let Some(exceptions) = exceptions {
            active.extend(
                exceptions
                    .iter()
                    .filter(|(_, exception)| **exception == Exception::Added)
                    .map(|(service_id, _)| service_id.clone()),
            );
        }

        active
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::date;

    fn calendar() -> ServiceCalendar {
        let mut calendar = ServiceCalendar::new();
        calendar.add_rule(CalendarRule {
            service_id: "WK".to_string(),
            weekdays: [true, true, true, true, true, false, false],
            start_date: date(2024, 1, 1),
            end_date: date(2024, 6, 30),
        });
        calendar.add_rule(CalendarRule {
            service_id: "SA".to_string(),
            weekdays: [false, false, false, false, false, true, false],
            start_date: date(2024, 1, 1),
            end_date: date(2024, 6, 30),
        });
        calendar
    }

    #[test]
    fn test_weekly_rules() {
        let calendar = calendar();
        // Friday
        assert_eq!(
            calendar.active_services(&date(2024, 3, 1)),
            BTreeSet::from(["WK".to_string()])
        );
        // Saturday
        assert_eq!(
            calendar.active_services(&date(2024, 3, 2)),
            BTreeSet::from(["SA".to_string()])
        );
        // Sunday, and after the end date
        assert!(calendar.active_services(&date(2024, 3, 3)).is_empty());
        assert!(calendar.active_services(&date(2024, 7, 1)).is_empty());
    }

    #[test]
    fn test_exceptions() {
        let mut calendar = calendar();
        // Good Friday runs a Saturday service
        calendar.add_exception("WK", date(2024, 3, 29), Exception::Removed);
        calendar.add_exception("SA", date(2024, 3, 29), Exception::Added);
        // Services only defined by exceptions
        calendar.add_exception("EVENT", date(2024, 3, 30), Exception::Added);

        assert_eq!(
            calendar.active_services(&date(2024, 3, 29)),
            BTreeSet::from(["SA".to_string()])
        );
        assert_eq!(
            calendar.active_services(&date(2024, 3, 30)),
            BTreeSet::from(["EVENT".to_string(), "SA".to_string()])
        );
    }
}
