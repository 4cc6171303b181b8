//! The frozen clock.
//!
//! Each handler family stamps every row it writes with one fixed literal.
//! "Future" and "past" checks compare against the date part of that same
//! literal, so outcomes depend only on the database and the arguments.

use chrono::{NaiveDate, NaiveDateTime};

pub const HR_TIMESTAMP: &str = "2025-10-01T12:00:00";
pub const INCIDENT_TIMESTAMP: &str = "2025-10-07T12:00:00";
pub const SMART_HOME_TIMESTAMP: &str = "2025-10-10T12:00:00";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenClock {
    timestamp: String,
    today: NaiveDate,
}

impl FrozenClock {
    /// Build a clock from an ISO-8601 literal (`YYYY-MM-DDTHH:MM:SS`).
    pub fn new(timestamp: &str) -> Result<Self, chrono::ParseError> {
        let parsed = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)?;
        Ok(Self {
            timestamp: timestamp.to_string(),
            today: parsed.date(),
        })
    }

    /// The literal written to `created_at` / `updated_at`.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn is_future(&self, date: NaiveDate) -> bool {
        date > self.today
    }

    pub fn is_past(&self, date: NaiveDate) -> bool {
        date < self.today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_literals_parse() {
        for literal in [HR_TIMESTAMP, INCIDENT_TIMESTAMP, SMART_HOME_TIMESTAMP] {
            let clock = FrozenClock::new(literal).unwrap();
            assert_eq!(clock.timestamp(), literal);
        }
    }

    #[test]
    fn test_future_and_past() {
        let clock = FrozenClock::new(HR_TIMESTAMP).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        assert_eq!(clock.today(), today);
        assert!(!clock.is_future(today));
        assert!(!clock.is_past(today));
        assert!(clock.is_future(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
        assert!(clock.is_past(NaiveDate::from_ymd_opt(2025, 9, 30).unwrap()));
    }

    #[test]
    fn test_rejects_malformed_literal() {
        assert!(FrozenClock::new("2025-10-01").is_err());
        assert!(FrozenClock::new("10-01-2025T12:00:00").is_err());
    }
}
