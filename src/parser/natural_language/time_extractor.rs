//! Time extraction module for natural language parsing
//!
//! Turns phrases such as `明天下午3点` or `15号上午十点半到十二点` into an absolute
//! [`TimeWindow`] relative to an injected reference instant. The reference
//! instant is always a parameter so extraction stays deterministic.
//!
//! Resolution happens in three steps:
//!
//! 1. the clock time is located with an ordered list of matchers, most specific
//!    first (`HH:MM` before `N点`); without a clock time nothing is returned,
//! 2. the day is resolved from a relative marker (`今天`, `明天`, `后天`) or an
//!    explicit day of month (`15号`, `3月8日`), defaulting to today,
//! 3. the period qualifier (`上午`, `中午`, `下午`, `晚上`) promotes the hour to the
//!    24-hour clock.

use super::numerals::{parse_number, NUMERAL_ALTERNATION};
use crate::calendar::TimeWindow;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const DEFAULT_EVENT_DURATION_MINUTES: i64 = 60;

/// Period-of-day qualifier preceding a clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    Morning,
    Noon,
    Afternoon,
    Evening,
}

const PERIOD_WORDS: &[(&str, DayPeriod)] = &[
    ("早上", DayPeriod::Morning),
    ("上午", DayPeriod::Morning),
    ("早晨", DayPeriod::Morning),
    ("清晨", DayPeriod::Morning),
    ("凌晨", DayPeriod::Morning),
    ("今早", DayPeriod::Morning),
    ("明早", DayPeriod::Morning),
    ("中午", DayPeriod::Noon),
    ("下午", DayPeriod::Afternoon),
    ("晚上", DayPeriod::Evening),
    ("傍晚", DayPeriod::Evening),
    ("夜里", DayPeriod::Evening),
    ("今晚", DayPeriod::Evening),
    ("明晚", DayPeriod::Evening),
];

/// Relative day markers and their offset from today.
const RELATIVE_DAY_WORDS: &[(&str, i64)] = &[
    ("今天", 0),
    ("今早", 0),
    ("今晚", 0),
    ("明天", 1),
    ("明早", 1),
    ("明晚", 1),
    ("后天", 2),
];

static PERIOD_ALTERNATION: Lazy<String> =
    Lazy::new(|| PERIOD_WORDS.iter().map(|(word, _)| *word).collect::<Vec<_>>().join("|"));

static COLON_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\d])(?P<hour>\d{1,2})[:：](?P<minute>\d{2})(?:[^\d]|$)").unwrap());

static HOUR_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:^|[^\d])(?P<hour>\d{{1,2}}|{})\s*[点时](?P<minute>半|一刻|三刻|\d{{1,2}}分?)?",
        NUMERAL_ALTERNATION.as_str()
    ))
    .unwrap()
});

static RANGE_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?:到|至|-|~|～|—)\s*(?P<period>{periods})?\s*(?:(?P<colon_hour>\d{{1,2}})[:：](?P<colon_minute>\d{{2}})|(?P<hour>\d{{1,2}}|{words})(?:\s*(?P<marker>[点时])(?P<minute>半|一刻|三刻|\d{{1,2}}分?)?)?)",
        periods = PERIOD_ALTERNATION.as_str(),
        words = NUMERAL_ALTERNATION.as_str()
    ))
    .unwrap()
});

static DURATION_HOURS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?P<hours>\d{{1,2}}|{})\s*个?\s*(?P<half>半)?\s*(?:小时|钟头)",
        NUMERAL_ALTERNATION.as_str()
    ))
    .unwrap()
});

static HALF_HOUR_DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"半\s*个?\s*(?:小时|钟头)").unwrap());

static DURATION_MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<minutes>\d{1,3})\s*分钟").unwrap());

/// Characters that, right before a numeral-word hour, show it is part of a
/// longer number or an idiom (`二十四点`, `早一点`, `有一点事`, `第一时间`).
const NUMERAL_HOUR_BLOCKERS: &str = "一二三四五六七八九十两早晚快慢有第";

/// Words around a duration that make it a reminder or relative offset
/// (`提前30分钟`, `2小时后`) rather than the event's length.
const OFFSET_PREFIXES: &[&str] = &["提前", "早"];
const OFFSET_SUFFIXES: &[&str] = &["以前", "之前", "以后", "之后", "前", "后", "提醒"];

static MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\d])(?:(?P<month>\d{1,2})月)?(?P<day>\d{1,2})[号日]").unwrap()
});

/// How the clock time was written; decides the no-period promotion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notation {
    /// `14:30`, read as a 24-hour clock.
    Colon,
    /// `3点`, `三点半`.
    Spoken,
}

/// Clock-time matchers in the order they are tried.
#[derive(Debug, Clone, Copy)]
enum ClockPattern {
    Colon,
    HourMarker,
}

const CLOCK_PATTERNS: [ClockPattern; 2] = [ClockPattern::Colon, ClockPattern::HourMarker];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClockMatch {
    hour: u32,
    minute: u32,
    notation: Notation,
    /// Byte offset where the clock expression starts.
    start: usize,
    /// Byte offset just past the clock expression.
    end: usize,
}

impl ClockPattern {
    fn find(self, text: &str) -> Option<ClockMatch> {
        match self {
            ClockPattern::Colon => {
                let caps = COLON_TIME_RE.captures(text)?;
                let hour_m = caps.name("hour")?;
                let minute_m = caps.name("minute")?;
                Some(ClockMatch {
                    hour: hour_m.as_str().parse().ok()?,
                    minute: minute_m.as_str().parse().ok()?,
                    notation: Notation::Colon,
                    start: hour_m.start(),
                    end: minute_m.end(),
                })
            }
            ClockPattern::HourMarker => HOUR_MARKER_RE.captures_iter(text).find_map(|caps| {
                let hour_m = caps.name("hour")?;
                let whole = caps.get(0)?;
                if !spoken_hour_allowed(&text[..hour_m.start()], hour_m.as_str()) {
                    debug!("Skipping '{}' as a clock time", whole.as_str());
                    return None;
                }
                Some(ClockMatch {
                    hour: parse_number(hour_m.as_str())?,
                    minute: parse_minute(caps.name("minute").map(|m| m.as_str()))?,
                    notation: Notation::Spoken,
                    start: hour_m.start(),
                    end: whole.end(),
                })
            }),
        }
    }
}

fn ends_with_keyword<T>(text: &str, table: &[(&str, T)]) -> bool {
    table.iter().any(|(word, _)| text.ends_with(word))
}

/// Whether a numeral-word hour such as `十` in `十点` reads as a clock time.
///
/// Digit hours are always accepted. A numeral word right after a period or day
/// word (`明早八点`, `下午一点`) is accepted. Otherwise it must not continue a
/// number or idiom, and a lone `一` is never enough on its own.
fn spoken_hour_allowed(before: &str, token: &str) -> bool {
    if token.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    let before = before.trim_end();
    if ends_with_keyword(before, PERIOD_WORDS) || ends_with_keyword(before, RELATIVE_DAY_WORDS) {
        return true;
    }
    if token == "一" {
        return false;
    }
    before.chars().next_back().map_or(true, |c| !NUMERAL_HOUR_BLOCKERS.contains(c))
}

/// A bare range end (`3点到5`) must close the phrase, so `到3楼` is a place.
fn closes_phrase(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || c.is_ascii_punctuation() || "，。！？；、）".contains(c),
    }
}

/// Minute suffix after `点`: `半`, `一刻`, `三刻` or digits with an optional `分`.
fn parse_minute(token: Option<&str>) -> Option<u32> {
    let minute = match token {
        None => 0,
        Some("半") => 30,
        Some("一刻") => 15,
        Some("三刻") => 45,
        Some(digits) => digits.trim_end_matches('分').parse().ok()?,
    };
    (minute < 60).then_some(minute)
}

/// Convert a spoken hour to the 24-hour clock.
///
/// Returns the hour and the number of days to carry (`晚上12点` is midnight of
/// the following day). A bare `N点` with N between 1 and 7 is read as an
/// afternoon hour: "3点" means 15:00. Callers rely on that bias, so it stays.
fn promote_hour(hour: u32, period: Option<DayPeriod>, notation: Notation) -> Option<(u32, i64)> {
    let (hour, carry) = match period {
        Some(DayPeriod::Afternoon) if hour < 12 => (hour + 12, 0),
        Some(DayPeriod::Evening) if hour == 12 => (0, 1),
        Some(DayPeriod::Evening) if hour < 12 => (hour + 12, 0),
        Some(DayPeriod::Noon) if (1..=5).contains(&hour) => (hour + 12, 0),
        Some(DayPeriod::Morning) if hour == 12 => (0, 0),
        None if notation == Notation::Spoken && (1..8).contains(&hour) => (hour + 12, 0),
        _ => (hour, 0),
    };
    (hour < 24).then_some((hour, carry))
}

/// Every occurrence of every keyword in `table`, as (byte offset, value).
fn keyword_positions<T: Copy>(text: &str, table: &[(&str, T)]) -> Vec<(usize, T)> {
    let mut found: Vec<(usize, T)> = table
        .iter()
        .flat_map(|(word, value)| text.match_indices(word).map(move |(pos, _)| (pos, *value)))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found
}

/// The occurrence closest before `anchor`, else the first one in the text.
fn nearest_before<T: Copy>(found: &[(usize, T)], anchor: usize) -> Option<T> {
    found
        .iter()
        .rev()
        .find(|(pos, _)| *pos < anchor)
        .or_else(|| found.first())
        .map(|(_, value)| *value)
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(first_of_next.pred_opt()?.day())
}

/// Build a date, clamping a day that the month lacks to the month's last day.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.min(last_day_of_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Nearest future occurrence of an explicit day of month.
///
/// Without a month the current month is used unless the day already passed,
/// in which case the next month is used. With a month the current year is used
/// unless the date already passed. Days missing from the target month (31号 in
/// April) are clamped to the month's last day.
pub fn resolve_month_day(today: NaiveDate, month: Option<u32>, day: u32) -> Option<NaiveDate> {
    if !(1..=31).contains(&day) {
        return None;
    }
    match month {
        Some(month) => {
            if !(1..=12).contains(&month) {
                return None;
            }
            let this_year = clamped_date(today.year(), month, day)?;
            if this_year >= today {
                Some(this_year)
            } else {
                clamped_date(today.year() + 1, month, day)
            }
        }
        None => {
            if day >= today.day() {
                clamped_date(today.year(), today.month(), day)
            } else if today.month() == 12 {
                clamped_date(today.year() + 1, 1, day)
            } else {
                clamped_date(today.year(), today.month() + 1, day)
            }
        }
    }
}

/// Resolve the date the text refers to, if it names one.
///
/// `anchor` is the byte offset of the clock expression; when several day
/// references exist the one closest before it wins.
fn resolve_day(text: &str, today: NaiveDate, anchor: usize) -> Option<NaiveDate> {
    let relative = keyword_positions(text, RELATIVE_DAY_WORDS);
    if let Some(offset) = nearest_before(&relative, anchor) {
        debug!("Relative day marker resolved to today{:+}", offset);
        return today.checked_add_signed(Duration::days(offset));
    }

    let explicit: Vec<(usize, (Option<u32>, u32))> = MONTH_DAY_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let day_m = caps.name("day")?;
            let day = day_m.as_str().parse().ok()?;
            let month = caps.name("month").and_then(|m| m.as_str().parse().ok());
            let start = caps.name("month").map_or(day_m.start(), |m| m.start());
            Some((start, (month, day)))
        })
        .collect();
    let (month, day) = nearest_before(&explicit, anchor)?;
    let resolved = resolve_month_day(today, month, day);
    debug!("Explicit day {:?}/{} resolved to {:?}", month, day, resolved);
    resolved
}

/// Date named by the text (relative marker or day of month), without requiring a clock time.
pub fn extract_date(text: &str, now: NaiveDateTime) -> Option<NaiveDate> {
    resolve_day(text, now.date(), text.len())
}

/// Find the clock time in `text`, trying the most specific pattern first.
fn find_clock(text: &str) -> Option<ClockMatch> {
    CLOCK_PATTERNS.iter().find_map(|pattern| pattern.find(text))
}

fn captured_period(caps: &Captures<'_>) -> Option<DayPeriod> {
    let word = caps.name("period")?.as_str();
    PERIOD_WORDS.iter().find(|(w, _)| *w == word).map(|(_, period)| *period)
}

/// Extracts absolute time windows from free text
#[derive(Debug, Clone, Copy)]
pub struct TemporalExtractor {
    default_duration: Duration,
}

impl Default for TemporalExtractor {
    fn default() -> Self {
        Self { default_duration: Duration::minutes(DEFAULT_EVENT_DURATION_MINUTES) }
    }
}

impl TemporalExtractor {
    /// Extractor whose windows last `default_duration` unless the text states an end.
    pub fn new(default_duration: Duration) -> Self {
        if default_duration <= Duration::zero() {
            return Self::default();
        }
        Self { default_duration }
    }

    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    /// Extract a time window from `text`, relative to `now`.
    ///
    /// Returns `None` when no clock time is present; a day alone is not enough
    /// to book anything.
    pub fn extract(&self, text: &str, now: NaiveDateTime) -> Option<TimeWindow> {
        let text = text.trim();
        let clock = match find_clock(text) {
            Some(clock) => clock,
            None => {
                debug!("No clock time found in '{}'", text);
                return None;
            }
        };

        let periods = keyword_positions(text, PERIOD_WORDS);
        let period = nearest_before(&periods, clock.start);
        let (hour, carry) = promote_hour(clock.hour, period, clock.notation)?;

        let date = resolve_day(text, now.date(), clock.start).unwrap_or_else(|| now.date());
        let date = date.checked_add_signed(Duration::days(carry))?;
        let start = date.and_time(NaiveTime::from_hms_opt(hour, clock.minute, 0)?);
        debug!(
            "Clock {:02}:{:02} with period {:?} on {} -> {}",
            clock.hour, clock.minute, period, date, start
        );

        let end = self
            .explicit_end(text, &clock, period, start)
            .unwrap_or(start + self.default_duration);
        TimeWindow::new(start, end).ok()
    }

    /// End time stated as a range (`到5点`) or a duration (`两个小时`).
    fn explicit_end(
        &self,
        text: &str,
        clock: &ClockMatch,
        start_period: Option<DayPeriod>,
        start: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let rest = &text[clock.end..];
        let range_end = RANGE_END_RE.captures(rest).and_then(|caps| {
            let bare_hour = caps.name("hour").is_some() && caps.name("marker").is_none();
            if bare_hour && !closes_phrase(&rest[caps.get(0)?.end()..]) {
                return None;
            }
            let period = captured_period(&caps).or(start_period);
            let (hour, minute, notation) = match (caps.name("colon_hour"), caps.name("colon_minute")) {
                (Some(h), Some(m)) => (h.as_str().parse().ok()?, m.as_str().parse().ok()?, Notation::Colon),
                _ => (
                    parse_number(caps.name("hour")?.as_str())?,
                    parse_minute(caps.name("minute").map(|m| m.as_str()))?,
                    // a bare `5` in `3点到5` follows the start's notation
                    clock.notation,
                ),
            };
            if minute >= 60 {
                return None;
            }
            let (hour, carry) = promote_hour(hour, period, notation)?;
            let date = start.date().checked_add_signed(Duration::days(carry))?;
            Some(date.and_time(NaiveTime::from_hms_opt(hour, minute, 0)?))
        });
        if let Some(end) = range_end.filter(|end| *end > start) {
            debug!("Explicit end time {}", end);
            return Some(end);
        }

        let duration = parse_duration(rest)?;
        debug!("Explicit duration of {} minutes", duration.num_minutes());
        Some(start + duration)
    }
}

fn is_offset(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].trim_end();
    let after = text[end..].trim_start();
    OFFSET_PREFIXES.iter().any(|w| before.ends_with(w)) || OFFSET_SUFFIXES.iter().any(|w| after.starts_with(w))
}

/// Duration stated in the text, such as `2小时`, `一个半小时`, `半小时` or `45分钟`.
///
/// Reminder lead times and relative offsets (`提前30分钟`, `2小时后`) are skipped.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let hour_matches: Vec<Captures<'_>> = DURATION_HOURS_RE.captures_iter(text).collect();
    for caps in &hour_matches {
        let whole = caps.get(0)?;
        if is_offset(text, whole.start(), whole.end()) {
            continue;
        }
        let hours = parse_number(caps.name("hours")?.as_str())?;
        let half = if caps.name("half").is_some() { 30 } else { 0 };
        let minutes = i64::from(hours) * 60 + half;
        return (minutes > 0).then(|| Duration::minutes(minutes));
    }

    // `半小时` inside `一个半小时` belongs to the hour match
    let inside_hours = |start: usize, end: usize| {
        hour_matches
            .iter()
            .filter_map(|caps| caps.get(0))
            .any(|m| m.start() < end && start < m.end())
    };
    if HALF_HOUR_DURATION_RE
        .find_iter(text)
        .any(|m| !inside_hours(m.start(), m.end()) && !is_offset(text, m.start(), m.end()))
    {
        return Some(Duration::minutes(30));
    }

    DURATION_MINUTES_RE.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        if is_offset(text, whole.start(), whole.end()) {
            return None;
        }
        let minutes: i64 = caps.name("minutes")?.as_str().parse().ok()?;
        (minutes > 0).then(|| Duration::minutes(minutes))
    })
}

/// Extract a window with the default one-hour duration.
pub fn extract_datetime(text: &str, now: NaiveDateTime) -> Option<TimeWindow> {
    TemporalExtractor::default().extract(text, now)
}
