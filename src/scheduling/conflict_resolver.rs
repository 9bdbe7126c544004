//! Conflict detection and alternative-time suggestions
//!
//! The resolver is stateless: every call reads the event store afresh. Overlap
//! uses half-open windows, so an event ending at 11:00 never conflicts with one
//! starting at 11:00.

use crate::calendar::{Event, EventStore, StoreError};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use futures::future::join_all;
use log::{debug, error, info};
use std::sync::Arc;

/// Margin added on both sides of a candidate when querying the store.
pub const DEFAULT_SEARCH_PADDING_MINUTES: i64 = 120;
pub const DEFAULT_MAX_SUGGESTIONS: usize = 8;
pub const DEFAULT_DAY_START_HOUR: u32 = 6;
pub const DEFAULT_DAY_END_HOUR: u32 = 23;
pub const DEFAULT_SLOT_FIRST_HOUR: u32 = 6;
pub const DEFAULT_SLOT_LAST_HOUR: u32 = 21;

/// Alternative start offsets as (days, minutes) from the requested start,
/// grouped in tiers and listed in generation order.
const SUGGESTION_TIERS: &[&[(i64, i64)]] = &[
    &[(0, -30), (0, 30), (0, -60), (0, 60)],
    &[(-1, 0), (1, 0)],
    &[(-1, -60), (-1, 60), (1, -60), (1, 60)],
    &[(-2, 0), (2, 0), (-3, 0), (3, 0)],
];

/// Errors surfaced to callers of the resolver
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid event window: start {start} is not before end {end}")]
    InvalidWindow { start: NaiveDateTime, end: NaiveDateTime },
    #[error("Event store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Tunable resolver constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    pub search_padding: Duration,
    /// Earliest start time a suggestion may have.
    pub day_start: NaiveTime,
    /// Latest end time a suggestion may have, on the day it starts.
    pub day_end: NaiveTime,
    pub max_suggestions: usize,
    pub slot_first_hour: u32,
    pub slot_last_hour: u32,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            search_padding: Duration::minutes(DEFAULT_SEARCH_PADDING_MINUTES),
            day_start: NaiveTime::from_hms_opt(DEFAULT_DAY_START_HOUR, 0, 0).expect("valid hour"),
            day_end: NaiveTime::from_hms_opt(DEFAULT_DAY_END_HOUR, 0, 0).expect("valid hour"),
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
            slot_first_hour: DEFAULT_SLOT_FIRST_HOUR,
            slot_last_hour: DEFAULT_SLOT_LAST_HOUR,
        }
    }
}

/// Parameters of a suggestion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestionQuery {
    /// Reference instant; nothing at or before it is suggested.
    pub now: NaiveDateTime,
    /// Time the distance is measured from; defaults to the candidate's start.
    pub base_time: Option<NaiveDateTime>,
    /// Defaults to [`ResolverSettings::max_suggestions`].
    pub max_suggestions: Option<usize>,
}

impl SuggestionQuery {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now, base_time: None, max_suggestions: None }
    }

    pub fn base_time(mut self, base_time: NaiveDateTime) -> Self {
        self.base_time = Some(base_time);
        self
    }

    pub fn max_suggestions(mut self, max_suggestions: usize) -> Self {
        self.max_suggestions = Some(max_suggestions);
        self
    }
}

/// Conflicts of a candidate plus alternatives when there are any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub conflicts: Vec<Event>,
    pub suggestions: Vec<NaiveDateTime>,
}

impl ConflictReport {
    pub fn is_clear(&self) -> bool {
        self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    order: usize,
    start: NaiveDateTime,
    distance: Duration,
}

fn candidate_tiers(base: NaiveDateTime) -> Vec<Vec<Candidate>> {
    let mut order = 0;
    SUGGESTION_TIERS
        .iter()
        .map(|tier| {
            tier.iter()
                .map(|(days, minutes)| {
                    let offset = Duration::days(*days) + Duration::minutes(*minutes);
                    let distance = if offset < Duration::zero() { -offset } else { offset };
                    let candidate = Candidate { order, start: base + offset, distance };
                    order += 1;
                    candidate
                })
                .collect()
        })
        .collect()
}

fn ensure_valid_window(event: &Event) -> Result<(), SchedulingError> {
    if event.start >= event.end {
        return Err(SchedulingError::InvalidWindow { start: event.start, end: event.end });
    }
    Ok(())
}

/// Detects overlaps against an [`EventStore`] and proposes free alternatives
#[derive(Clone)]
pub struct ConflictResolver {
    store: Arc<dyn EventStore>,
    settings: ResolverSettings,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn EventStore>, settings: ResolverSettings) -> Self {
        Self { store, settings }
    }

    pub fn with_defaults(store: Arc<dyn EventStore>) -> Self {
        Self::new(store, ResolverSettings::default())
    }

    /// Stored events overlapping `candidate`, ordered by start.
    ///
    /// The candidate's own id is ignored so an event can be checked in place
    /// while it is being modified. A failing store is reported, never read as
    /// "no conflicts".
    pub async fn find_conflicts(&self, candidate: &Event) -> Result<Vec<Event>, SchedulingError> {
        ensure_valid_window(candidate)?;
        let from = candidate.start - self.settings.search_padding;
        let to = candidate.end + self.settings.search_padding;

        let events = self.store.list_events(from, to).await.map_err(|e| {
            error!("Conflict query {} - {} failed: {}", from, to, e);
            SchedulingError::from(e)
        })?;

        let conflicts: Vec<Event> =
            events.into_iter().filter(|e| e.id != candidate.id && e.overlaps(candidate)).collect();
        debug!("'{}' at {} has {} conflicts", candidate.title, candidate.start, conflicts.len());
        Ok(conflicts)
    }

    /// Whether a slot of `duration` starting at `start` lies inside the permitted daily window.
    pub fn within_daily_window(&self, start: NaiveDateTime, duration: Duration) -> bool {
        let end = start + duration;
        start.time() >= self.settings.day_start && end <= start.date().and_time(self.settings.day_end)
    }

    async fn is_free(&self, start: NaiveDateTime, duration: Duration) -> Result<bool, SchedulingError> {
        let probe = Event::probe(start, duration);
        Ok(self.find_conflicts(&probe).await?.is_empty())
    }

    /// Free start times near the requested one, closest first.
    ///
    /// Offsets are probed tier by tier with the probes of a tier running
    /// concurrently. Once enough slots are found and no untested offset can be
    /// closer than the last kept one, the remaining tiers are skipped; the
    /// result is the same as probing everything.
    pub async fn suggest_alternatives(
        &self,
        candidate: &Event,
        query: SuggestionQuery,
    ) -> Result<Vec<NaiveDateTime>, SchedulingError> {
        ensure_valid_window(candidate)?;
        let base = query.base_time.unwrap_or(candidate.start);
        let limit = query.max_suggestions.unwrap_or(self.settings.max_suggestions);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let duration = candidate.duration();
        let tiers = candidate_tiers(base);
        let mut accepted: Vec<Candidate> = Vec::new();

        for (index, tier) in tiers.iter().enumerate() {
            let probes = tier
                .iter()
                .filter(|c| c.start > query.now && self.within_daily_window(c.start, duration))
                .map(|c| async move { self.is_free(c.start, duration).await.map(|free| free.then_some(*c)) });

            for result in join_all(probes).await {
                if let Some(candidate) = result? {
                    accepted.push(candidate);
                }
            }
            accepted.sort_by(|a, b| a.distance.cmp(&b.distance).then(a.order.cmp(&b.order)));

            if accepted.len() >= limit {
                let cutoff = accepted[limit - 1].distance;
                let closest_remaining = tiers[index + 1..].iter().flatten().map(|c| c.distance).min();
                if closest_remaining.map_or(true, |distance| distance >= cutoff) {
                    debug!("Enough suggestions after tier {}, skipping the rest", index + 1);
                    break;
                }
            }
        }

        accepted.truncate(limit);
        info!("Suggesting {} alternatives for '{}' around {}", accepted.len(), candidate.title, base);
        Ok(accepted.into_iter().map(|c| c.start).collect())
    }

    /// Whole-hour starts on `date` where an event of `duration` fits.
    pub async fn available_slots(
        &self,
        date: NaiveDate,
        duration: Duration,
    ) -> Result<Vec<NaiveDateTime>, SchedulingError> {
        if duration <= Duration::zero() {
            let first = date.and_time(self.settings.day_start);
            return Err(SchedulingError::InvalidWindow { start: first, end: first + duration });
        }

        let starts: Vec<NaiveDateTime> = (self.settings.slot_first_hour..=self.settings.slot_last_hour)
            .filter_map(|hour| date.and_hms_opt(hour, 0, 0))
            .filter(|start| self.within_daily_window(*start, duration))
            .collect();
        let probes = starts.iter().map(|start| async move {
            self.is_free(*start, duration).await.map(|free| free.then_some(*start))
        });

        let mut slots = Vec::new();
        for result in join_all(probes).await {
            if let Some(start) = result? {
                slots.push(start);
            }
        }
        debug!("{} free slots of {} minutes on {}", slots.len(), duration.num_minutes(), date);
        Ok(slots)
    }

    /// Conflicts of `candidate` and, when it clashes, alternatives for it.
    pub async fn check(
        &self,
        candidate: &Event,
        query: SuggestionQuery,
    ) -> Result<ConflictReport, SchedulingError> {
        let conflicts = self.find_conflicts(candidate).await?;
        if conflicts.is_empty() {
            return Ok(ConflictReport::default());
        }
        let suggestions = self.suggest_alternatives(candidate, query).await?;
        Ok(ConflictReport { conflicts, suggestions })
    }
}
