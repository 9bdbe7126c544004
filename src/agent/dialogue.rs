//! Conversation state carried between agent turns

use crate::calendar::{Event, TimeWindow};
use chrono::{Duration, NaiveDateTime};

/// Details of an event being added while the agent still needs its time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDraft {
    pub title: String,
    pub location: Option<String>,
    /// Duration stated in the first request, applied once the time is known.
    pub duration: Option<Duration>,
}

/// Change waiting for the user's confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Add(Event),
    Reschedule { event: Event, window: TimeWindow },
    Delete(Event),
}

impl PendingAction {
    /// Event as it would look after the action is applied.
    pub fn target(&self) -> Event {
        match self {
            PendingAction::Add(event) | PendingAction::Delete(event) => event.clone(),
            PendingAction::Reschedule { event, window } => event.rescheduled(*window),
        }
    }
}

/// Edit to apply once the user has picked one of several matching events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingEdit {
    /// Move the chosen event to the time named in `request`; the event keeps its
    /// own duration unless the request states an end.
    Reschedule { request: String, requested_at: NaiveDateTime },
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DialogueState {
    #[default]
    Idle,
    AwaitingTime(PendingDraft),
    /// `suggestions` is non-empty when the action clashes with stored events;
    /// the user may answer with the number of one of them.
    AwaitingConfirmation { action: PendingAction, suggestions: Vec<NaiveDateTime> },
    AwaitingEventSelection { candidates: Vec<Event>, edit: PendingEdit },
}

impl DialogueState {
    pub fn is_idle(&self) -> bool {
        matches!(self, DialogueState::Idle)
    }

    /// Short label for prompts and logs.
    pub fn label(&self) -> &'static str {
        match self {
            DialogueState::Idle => "idle",
            DialogueState::AwaitingTime(_) => "awaiting_time",
            DialogueState::AwaitingConfirmation { .. } => "awaiting_confirmation",
            DialogueState::AwaitingEventSelection { .. } => "awaiting_selection",
        }
    }
}

/// Zero-based index of a numbered choice such as `2`, `第2个` or `选2`.
pub fn parse_choice(text: &str, count: usize) -> Option<usize> {
    let digits = text
        .trim()
        .trim_start_matches(['第', '选'])
        .trim_end_matches(|c: char| "个项。.!！ ".contains(c));
    let number: usize = digits.parse().ok()?;
    (1..=count).contains(&number).then(|| number - 1)
}
