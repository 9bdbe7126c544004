//! Event store abstraction
//!
//! The scheduling core only ever calls [`EventStore::list_events`]; the mutating
//! operations exist for the agent that applies confirmed actions.

use super::{validate_event, Event};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::debug;
use tokio::sync::RwLock;

/// Errors raised by event store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Event store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Event store data is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Event '{0}' not found")]
    NotFound(String),
    #[error("Event '{0}' already exists")]
    Duplicate(String),
    #[error("Event rejected: {0}")]
    Rejected(#[from] super::CalendarError),
    #[error("Event store file exceeds size limits: {0}")]
    TooLarge(String),
    #[error("Event store unavailable: {0}")]
    Unavailable(String),
}

/// Storage backend holding the user's events
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events whose window intersects `[start, end]`, ordered by start time.
    async fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Event>, StoreError>;

    async fn add_event(&self, event: Event) -> Result<(), StoreError>;

    /// Replace the stored event carrying the same id.
    async fn update_event(&self, event: Event) -> Result<(), StoreError>;

    async fn remove_event(&self, id: &str) -> Result<Event, StoreError>;
}

/// Range filter shared by the store implementations.
pub(crate) fn select_in_range(events: &[Event], start: NaiveDateTime, end: NaiveDateTime) -> Vec<Event> {
    let mut selected: Vec<Event> =
        events.iter().filter(|e| e.start <= end && start <= e.end).cloned().collect();
    selected.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    selected
}

/// Volatile store, used by tests and by the REPL when no state directory is wanted.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        Self { events: RwLock::new(events) }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Event>, StoreError> {
        let events = self.events.read().await;
        let selected = select_in_range(&events, start, end);
        debug!("Memory store returned {} events for {} - {}", selected.len(), start, end);
        Ok(selected)
    }

    async fn add_event(&self, event: Event) -> Result<(), StoreError> {
        validate_event(&event)?;
        let mut events = self.events.write().await;
        if events.iter().any(|e| e.id == event.id) {
            return Err(StoreError::Duplicate(event.id));
        }
        events.push(event);
        Ok(())
    }

    async fn update_event(&self, event: Event) -> Result<(), StoreError> {
        validate_event(&event)?;
        let mut events = self.events.write().await;
        match events.iter_mut().find(|e| e.id == event.id) {
            Some(slot) => {
                *slot = event;
                Ok(())
            }
            None => Err(StoreError::NotFound(event.id)),
        }
    }

    async fn remove_event(&self, id: &str) -> Result<Event, StoreError> {
        let mut events = self.events.write().await;
        let index = events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(events.remove(index))
    }
}
