//! Validation functions for calendar event data.
//
// Used by the agent and the REPL before anything reaches a store.

use super::{CalendarError, Event};
use chrono::{Datelike, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}$").unwrap());

/// Parse a YYYY-MM-DD date within the supported year range.
pub fn parse_date(date: &str) -> Result<NaiveDate, CalendarError> {
    if !DATE_RE.is_match(date) {
        return Err(CalendarError::InvalidDateTime(date.to_string()));
    }
    let naive_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| CalendarError::InvalidDateTime(date.to_string()))?;
    if (2000..=2100).contains(&naive_date.year()) {
        Ok(naive_date)
    } else {
        Err(CalendarError::InvalidDateTime(date.to_string()))
    }
}

/// Parse an HH:MM time of day.
pub fn parse_time(time: &str) -> Result<NaiveTime, CalendarError> {
    if !TIME_RE.is_match(time) {
        return Err(CalendarError::InvalidDateTime(time.to_string()));
    }
    NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| CalendarError::InvalidDateTime(time.to_string()))
}

/// Reject events that must never be written to a store.
pub fn validate_event(event: &Event) -> Result<(), CalendarError> {
    if event.start >= event.end {
        return Err(CalendarError::InvalidWindow { start: event.start, end: event.end });
    }
    if event.title.trim().is_empty() {
        return Err(CalendarError::EmptyTitle);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::TimeWindow;
    use test_case::test_case;

    #[test_case("2024-01-15", true)]
    #[test_case("2024-02-30", false)]
    #[test_case("1999-12-31", false)]
    #[test_case("2024/01/15", false)]
    fn test_parse_date(input: &str, valid: bool) {
        let parsed = parse_date(input);
        assert_eq!(parsed.is_ok(), valid);
        if valid {
            assert_eq!(parsed.unwrap(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        }
    }

    #[test_case("9:05", Some((9, 5)))]
    #[test_case("23:59", Some((23, 59)))]
    #[test_case("24:00", None)]
    #[test_case("12:60", None)]
    #[test_case("1230", None)]
    fn test_parse_time(input: &str, expected: Option<(u32, u32)>) {
        let expected = expected.map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap());
        assert_eq!(parse_time(input).ok(), expected);
    }

    #[test]
    fn test_validate_event_rejects_blank_title() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let window = TimeWindow::new(start, start + chrono::Duration::hours(1)).unwrap();
        assert!(validate_event(&Event::new("周会", window)).is_ok());
        assert!(matches!(validate_event(&Event::new("  ", window)), Err(CalendarError::EmptyTitle)));
    }
}
