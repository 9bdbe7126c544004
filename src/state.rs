use crate::calendar::store::select_in_range;
use crate::calendar::{validate_event, Event, EventStore, StoreError};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{debug, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const EVENTS_FILE: &str = "events.json";
// Maximum allowed size for state files to prevent DoS attacks (10MB)
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const MAX_ITEMS: usize = 10_000;

/// Event store persisted as a single pretty-printed JSON array.
///
/// Every operation re-reads the file so that several processes sharing the
/// directory see each other's writes; the mutex only serialises writers of
/// this process. File access goes through `tokio::fs` so a slow disk never
/// stalls the runtime.
pub struct JsonEventStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonEventStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let state_dir = state_dir.as_ref();
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join(EVENTS_FILE);
        info!("Using event store at {}", path.display());
        Ok(Self { path, write_lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn too_many(&self, count: usize) -> StoreError {
        StoreError::TooLarge(format!("{} holds {} events (maximum {})", self.path.display(), count, MAX_ITEMS))
    }

    async fn load(&self) -> Result<Vec<Event>, StoreError> {
        // Check file size before loading to prevent DoS attacks
        let metadata = match fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if metadata.len() > MAX_FILE_SIZE {
            return Err(StoreError::TooLarge(self.path.display().to_string()));
        }

        let bytes = fs::read(&self.path).await?;
        let json_value: serde_json::Value = serde_json::from_slice(&bytes)?;

        if let Some(array) = json_value.as_array() {
            if array.len() > MAX_ITEMS {
                return Err(self.too_many(array.len()));
            }
        }

        Ok(serde_json::from_value(json_value)?)
    }

    async fn save(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.len() > MAX_ITEMS {
            return Err(self.too_many(events.len()));
        }
        let bytes = serde_json::to_vec_pretty(events)?;
        fs::write(&self.path, bytes).await?;
        debug!("Saved {} events to {}", events.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl EventStore for JsonEventStore {
    async fn list_events(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Event>, StoreError> {
        let events = self.load().await?;
        Ok(select_in_range(&events, start, end))
    }

    async fn add_event(&self, event: Event) -> Result<(), StoreError> {
        validate_event(&event)?;
        let _guard = self.write_lock.lock().await;
        let mut events = self.load().await?;
        if events.iter().any(|e| e.id == event.id) {
            return Err(StoreError::Duplicate(event.id));
        }
        if events.len() >= MAX_ITEMS {
            return Err(self.too_many(events.len() + 1));
        }
        events.push(event);
        self.save(&events).await
    }

    async fn update_event(&self, event: Event) -> Result<(), StoreError> {
        validate_event(&event)?;
        let _guard = self.write_lock.lock().await;
        let mut events = self.load().await?;
        let slot = events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| StoreError::NotFound(event.id.clone()))?;
        *slot = event;
        self.save(&events).await
    }

    async fn remove_event(&self, id: &str) -> Result<Event, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut events = self.load().await?;
        let index = events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let removed = events.remove(index);
        self.save(&events).await?;
        Ok(removed)
    }
}
