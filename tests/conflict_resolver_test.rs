use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use ducktape_scheduler::{
    ConflictResolver, Event, EventStore, MemoryEventStore, SchedulingError, StoreError,
    SuggestionQuery, TimeWindow,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(hour, minute, 0).unwrap()
}

fn event(id: &str, start: NaiveDateTime, end: NaiveDateTime) -> Event {
    Event::with_id(id, id, TimeWindow::new(start, end).unwrap())
}

/// 2024-01-15 08:00, so anything on the 14th is in the past.
fn now() -> NaiveDateTime {
    at(15, 8, 0)
}

fn resolver_with(events: Vec<Event>) -> ConflictResolver {
    ConflictResolver::with_defaults(Arc::new(MemoryEventStore::with_events(events)))
}

/// Store that is always down
struct FailingStore;

#[async_trait]
impl EventStore for FailingStore {
    async fn list_events(&self, _: NaiveDateTime, _: NaiveDateTime) -> Result<Vec<Event>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn add_event(&self, _: Event) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn update_event(&self, _: Event) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn remove_event(&self, id: &str) -> Result<Event, StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }
}

/// Memory store counting range queries
struct CountingStore {
    inner: MemoryEventStore,
    queries: AtomicUsize,
}

#[async_trait]
impl EventStore for CountingStore {
    async fn list_events(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<Event>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.list_events(start, end).await
    }
    async fn add_event(&self, event: Event) -> Result<(), StoreError> {
        self.inner.add_event(event).await
    }
    async fn update_event(&self, event: Event) -> Result<(), StoreError> {
        self.inner.update_event(event).await
    }
    async fn remove_event(&self, id: &str) -> Result<Event, StoreError> {
        self.inner.remove_event(id).await
    }
}

#[tokio::test]
async fn test_touching_windows_do_not_conflict() {
    let resolver = resolver_with(vec![event("standup", at(15, 10, 0), at(15, 11, 0))]);

    let after = event("after", at(15, 11, 0), at(15, 12, 0));
    let before = event("before", at(15, 9, 0), at(15, 10, 0));
    assert!(resolver.find_conflicts(&after).await.unwrap().is_empty());
    assert!(resolver.find_conflicts(&before).await.unwrap().is_empty());

    let overlapping = event("overlapping", at(15, 10, 30), at(15, 11, 30));
    let conflicts = resolver.find_conflicts(&overlapping).await.unwrap();
    assert_eq!(conflicts.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["standup"]);
}

#[tokio::test]
async fn test_conflicts_ordered_and_own_id_ignored() {
    let resolver = resolver_with(vec![
        event("late", at(15, 14, 30), at(15, 16, 0)),
        event("early", at(15, 13, 0), at(15, 14, 30)),
        event("moving", at(15, 14, 0), at(15, 15, 0)),
    ]);
    let moving = event("moving", at(15, 14, 0), at(15, 15, 0));

    let ids: Vec<String> = resolver.find_conflicts(&moving).await.unwrap().into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec!["early".to_string(), "late".to_string()]);
}

#[tokio::test]
async fn test_find_conflicts_is_idempotent() {
    let resolver = resolver_with(vec![
        event("a", at(15, 9, 0), at(15, 10, 0)),
        event("b", at(15, 9, 30), at(15, 11, 0)),
    ]);
    let candidate = event("new", at(15, 9, 45), at(15, 10, 15));

    let first = resolver.find_conflicts(&candidate).await.unwrap();
    let second = resolver.find_conflicts(&candidate).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_invalid_window_rejected_before_query() {
    let store = Arc::new(CountingStore { inner: MemoryEventStore::new(), queries: AtomicUsize::new(0) });
    let resolver = ConflictResolver::with_defaults(store.clone());
    let empty = Event {
        id: "bad".to_string(),
        title: "bad".to_string(),
        start: at(15, 10, 0),
        end: at(15, 10, 0),
        location: None,
        description: None,
    };

    assert!(matches!(
        resolver.find_conflicts(&empty).await,
        Err(SchedulingError::InvalidWindow { .. })
    ));
    assert!(matches!(
        resolver.suggest_alternatives(&empty, SuggestionQuery::new(now())).await,
        Err(SchedulingError::InvalidWindow { .. })
    ));
    assert_eq!(store.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let resolver = ConflictResolver::with_defaults(Arc::new(FailingStore));
    let candidate = event("new", at(15, 14, 0), at(15, 15, 0));

    let result = resolver.find_conflicts(&candidate).await;
    assert!(matches!(result, Err(SchedulingError::StoreUnavailable(StoreError::Unavailable(_)))));

    let result = resolver.suggest_alternatives(&candidate, SuggestionQuery::new(now())).await;
    assert!(matches!(result, Err(SchedulingError::StoreUnavailable(_))));

    let result = resolver.available_slots(at(15, 0, 0).date(), Duration::hours(1)).await;
    assert!(matches!(result, Err(SchedulingError::StoreUnavailable(_))));
}

#[tokio::test]
async fn test_round_trip_suggestions() {
    let candidate = event("review", at(15, 14, 0), at(15, 15, 0));
    let store = Arc::new(MemoryEventStore::new());
    let resolver = ConflictResolver::with_defaults(store.clone());

    assert!(resolver.find_conflicts(&candidate).await.unwrap().is_empty());
    store.add_event(candidate.clone()).await.unwrap();

    let suggestions = resolver.suggest_alternatives(&candidate, SuggestionQuery::new(now())).await.unwrap();
    // ±30 minutes still overlap the stored slot; the 14th is in the past
    assert_eq!(
        suggestions,
        vec![
            at(15, 13, 0),
            at(15, 15, 0),
            at(16, 13, 0),
            at(16, 14, 0),
            at(16, 15, 0),
            at(17, 14, 0),
            at(18, 14, 0),
        ]
    );
}

#[tokio::test]
async fn test_suggestions_future_in_window_and_sorted() {
    let base = at(15, 6, 30);
    let now = at(15, 6, 0);
    let resolver = resolver_with(vec![event("early", base, base + Duration::hours(1))]);
    let candidate = event("clash", base, base + Duration::hours(1));

    let suggestions = resolver.suggest_alternatives(&candidate, SuggestionQuery::new(now)).await.unwrap();
    assert!(!suggestions.is_empty());
    let distance = |t: &NaiveDateTime| (*t - base).num_minutes().abs();
    for pair in suggestions.windows(2) {
        assert!(distance(&pair[0]) <= distance(&pair[1]));
    }
    for start in &suggestions {
        assert!(*start > now);
        assert!(start.time() >= chrono::NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        assert!(*start + Duration::hours(1) <= start.date().and_hms_opt(23, 0, 0).unwrap());
    }
    // 06:00 is not after now and 05:30 falls before the day starts
    assert!(!suggestions.contains(&at(15, 6, 0)));
    assert!(!suggestions.contains(&at(15, 5, 30)));
    assert_eq!(suggestions[0], at(15, 7, 30));
}

#[tokio::test]
async fn test_late_evening_suggestions_respect_day_end() {
    let resolver = resolver_with(vec![event("late", at(15, 21, 0), at(15, 22, 0))]);
    let candidate = event("clash", at(15, 21, 30), at(15, 22, 30));

    let suggestions = resolver.suggest_alternatives(&candidate, SuggestionQuery::new(now())).await.unwrap();
    // 22:00 to 23:00 ends exactly at the day end, 22:30 would not
    assert_eq!(suggestions[0], at(15, 22, 0));
    assert!(!suggestions.contains(&at(15, 22, 30)));
}

#[tokio::test]
async fn test_limit_and_early_termination() {
    let store = Arc::new(CountingStore {
        inner: MemoryEventStore::with_events(vec![event("busy", at(15, 14, 0), at(15, 15, 0))]),
        queries: AtomicUsize::new(0),
    });
    let resolver = ConflictResolver::with_defaults(store.clone());
    let candidate = event("new", at(15, 14, 0), at(15, 15, 0));

    let limited = resolver
        .suggest_alternatives(&candidate, SuggestionQuery::new(now()).max_suggestions(2))
        .await
        .unwrap();
    assert_eq!(limited, vec![at(15, 13, 0), at(15, 15, 0)]);
    // only the first tier was probed
    assert_eq!(store.queries.load(Ordering::SeqCst), 4);

    let full = resolver.suggest_alternatives(&candidate, SuggestionQuery::new(now())).await.unwrap();
    assert_eq!(&full[..2], &limited[..]);

    let none = resolver
        .suggest_alternatives(&candidate, SuggestionQuery::new(now()).max_suggestions(0))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_base_time_overrides_candidate_start() {
    let resolver = resolver_with(Vec::new());
    let candidate = event("new", at(15, 14, 0), at(15, 15, 0));

    let suggestions = resolver
        .suggest_alternatives(&candidate, SuggestionQuery::new(now()).base_time(at(16, 10, 0)))
        .await
        .unwrap();
    assert_eq!(suggestions[..2].to_vec(), vec![at(16, 9, 30), at(16, 10, 30)]);
}

#[tokio::test]
async fn test_check_reports_conflicts_and_alternatives() {
    let resolver = resolver_with(vec![event("busy", at(15, 14, 0), at(15, 15, 0))]);

    let clear = resolver.check(&event("free", at(15, 16, 0), at(15, 17, 0)), SuggestionQuery::new(now())).await.unwrap();
    assert!(clear.is_clear());
    assert!(clear.suggestions.is_empty());

    let report = resolver.check(&event("new", at(15, 14, 0), at(15, 15, 0)), SuggestionQuery::new(now())).await.unwrap();
    assert!(!report.is_clear());
    assert_eq!(report.conflicts[0].id, "busy");
    assert_eq!(report.suggestions[0], at(15, 13, 0));
}

#[tokio::test]
async fn test_available_slots() {
    let resolver = resolver_with(vec![event("busy", at(15, 14, 0), at(15, 15, 0))]);
    let date = at(15, 0, 0).date();

    let hourly = resolver.available_slots(date, Duration::hours(1)).await.unwrap();
    assert_eq!(hourly.len(), 15);
    assert_eq!(hourly.first(), Some(&at(15, 6, 0)));
    assert_eq!(hourly.last(), Some(&at(15, 21, 0)));
    assert!(!hourly.contains(&at(15, 14, 0)));

    let two_hours = resolver.available_slots(date, Duration::hours(2)).await.unwrap();
    assert_eq!(two_hours.len(), 14);
    assert!(!two_hours.contains(&at(15, 13, 0)));
    assert!(two_hours.contains(&at(15, 21, 0)));

    assert!(matches!(
        resolver.available_slots(date, Duration::zero()).await,
        Err(SchedulingError::InvalidWindow { .. })
    ));
}
