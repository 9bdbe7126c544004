//! Calendar data model shared by the extractor, the conflict resolver and the stores.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

mod calendar_validation;
pub mod store;

pub use calendar_validation::*;
pub use store::{EventStore, MemoryEventStore, StoreError};

/// Reserved id carried by availability probes. Never persisted.
pub const PROBE_EVENT_ID: &str = "temp_check";

/// Custom error type for calendar values
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Invalid time window: start {start} is not before end {end}")]
    InvalidWindow { start: NaiveDateTime, end: NaiveDateTime },
    #[error("Invalid date/time format: {0}")]
    InvalidDateTime(String),
    #[error("Event title must not be empty")]
    EmptyTitle,
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, CalendarError> {
        if start >= end {
            return Err(CalendarError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn with_duration(start: NaiveDateTime, duration: Duration) -> Result<Self, CalendarError> {
        Self::new(start, start + duration)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Boundary-touching windows do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.date() == self.end.date() {
            write!(f, "{} - {}", self.start.format("%Y-%m-%d %H:%M"), self.end.format("%H:%M"))
        } else {
            write!(
                f,
                "{} - {}",
                self.start.format("%Y-%m-%d %H:%M"),
                self.end.format("%Y-%m-%d %H:%M")
            )
        }
    }
}

/// A calendar event as held by an [`EventStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Event {
    /// Create an event with a freshly generated id.
    pub fn new(title: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            start: window.start,
            end: window.end,
            location: None,
            description: None,
        }
    }

    pub fn with_id(id: impl Into<String>, title: impl Into<String>, window: TimeWindow) -> Self {
        Self { id: id.into(), ..Self::new(title, window) }
    }

    /// Synthetic event used only to test whether a slot is free.
    pub fn probe(start: NaiveDateTime, duration: Duration) -> Self {
        Self {
            id: PROBE_EVENT_ID.to_string(),
            title: "availability probe".to_string(),
            start,
            end: start + duration,
            location: None,
            description: None,
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location.filter(|l| !l.is_empty());
        self
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow { start: self.start, end: self.end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Event) -> bool {
        self.window().overlaps(&other.window())
    }

    /// Move the event to a new window, keeping id and metadata.
    pub fn rescheduled(&self, window: TimeWindow) -> Self {
        Self { start: window.start, end: window.end, ..self.clone() }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.window())?;
        if let Some(location) = &self.location {
            write!(f, " @ {}", location)?;
        }
        Ok(())
    }
}
