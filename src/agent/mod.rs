//! Conversational scheduling agent
//!
//! [`CalendarAgent`] turns one line of user text into one reply. It classifies
//! the text, extracts times, consults the [`ConflictResolver`] and keeps the
//! conversation in an explicit [`DialogueState`] between turns. Nothing is
//! written to the store until the user confirms.

pub mod dialogue;

pub use dialogue::{parse_choice, DialogueState, PendingAction, PendingDraft, PendingEdit};

use crate::calendar::{Event, EventStore, TimeWindow};
use crate::config::Config;
use crate::parser::natural_language::intent::DEFAULT_TITLE;
use crate::parser::natural_language::utils::sanitize_user_input;
use crate::parser::natural_language::{extract_date, IntentClassifier, IntentKind, ParsedIntent};
use crate::parser::TemporalExtractor;
use crate::scheduling::{ConflictResolver, ResolverSettings, SuggestionQuery};
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use std::fmt::Write as _;
use std::sync::Arc;

/// Classifier confidence below which a request is not acted on.
pub const MIN_CONFIDENCE: f32 = 0.3;
/// Days searched when looking up an event by title or listing upcoming events.
pub const LOOKAHEAD_DAYS: i64 = 7;

const NOT_UNDERSTOOD_REPLY: &str = "抱歉，我没有理解您的意思。您可以告诉我需要添加、修改或查询日程。";
const EMPTY_INPUT_REPLY: &str = "请输入内容。";

pub const HELP_TEXT: &str = "我可以帮您管理日程：
  添加：明天下午3点在3楼会议室开会
  修改：把周会改到后天上午10点
  删除：删除明天的周会
  查询：明天有什么安排
  列出：列出本周的安排
需要确认时回复“确认”或“取消”，有候选项时回复序号。";

/// Settings the agent is built with
#[derive(Debug, Clone, Default)]
pub struct AgentSettings {
    pub extractor: TemporalExtractor,
    pub resolver: ResolverSettings,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            extractor: TemporalExtractor::new(config.default_duration()),
            resolver: config.resolver_settings()?,
        })
    }
}

pub struct CalendarAgent {
    store: Arc<dyn EventStore>,
    classifier: Box<dyn IntentClassifier>,
    extractor: TemporalExtractor,
    resolver: ConflictResolver,
    state: DialogueState,
}

fn format_time(time: NaiveDateTime) -> String {
    time.format("%Y-%m-%d %H:%M").to_string()
}

fn start_of_day(date: NaiveDate) -> Result<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0).ok_or_else(|| anyhow!("Invalid date {}", date))
}

fn describe(event: &Event) -> String {
    let mut text = format!("标题：{}\n时间：{}", event.title, event.window());
    if let Some(location) = &event.location {
        let _ = write!(text, "\n地点：{}", location);
    }
    text
}

fn numbered_events(events: &[Event], time_format: &str) -> String {
    events
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {} - {}", i + 1, e.title, e.start.format(time_format)))
        .collect::<Vec<_>>()
        .join("\n")
}

impl CalendarAgent {
    pub fn new(
        store: Arc<dyn EventStore>,
        classifier: Box<dyn IntentClassifier>,
        settings: AgentSettings,
    ) -> Self {
        let resolver = ConflictResolver::new(Arc::clone(&store), settings.resolver);
        Self { store, classifier, extractor: settings.extractor, resolver, state: DialogueState::Idle }
    }

    pub fn state(&self) -> &DialogueState {
        &self.state
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub fn reset(&mut self) {
        self.state = DialogueState::Idle;
    }

    /// Handle one user turn and produce the reply.
    ///
    /// Replies to pending questions (a time, a numbered choice) are handled
    /// before classification. Store and resolver failures are reported in the
    /// reply; only classifier failures surface as errors.
    pub async fn process_input(&mut self, input: &str, now: NaiveDateTime) -> Result<String> {
        let text = sanitize_user_input(input);
        if text.is_empty() {
            return Ok(EMPTY_INPUT_REPLY.to_string());
        }

        if let Some(reply) = self.continue_dialogue(&text, now).await? {
            return Ok(reply);
        }

        let parsed = self.classifier.classify(&text).await.context("Failed to classify input")?;
        debug!(
            "Intent {} ({:.2}) in state {}: {:?}",
            parsed.intent,
            parsed.confidence,
            self.state.label(),
            parsed.entities
        );
        if parsed.confidence < MIN_CONFIDENCE {
            return Ok(NOT_UNDERSTOOD_REPLY.to_string());
        }

        match parsed.intent {
            IntentKind::AddEvent => self.handle_add(&parsed, &text, now).await,
            IntentKind::ModifyEvent | IntentKind::DeleteEvent => self.handle_edit(&parsed, &text, now).await,
            IntentKind::QueryEvents => self.handle_query(&text, now).await,
            IntentKind::ListEvents => self.handle_list(now).await,
            IntentKind::ConfirmAction => self.handle_confirm().await,
            IntentKind::CancelAction => Ok(self.handle_cancel()),
            IntentKind::Help => Ok(HELP_TEXT.to_string()),
        }
    }

    /// Answers that only make sense in the current state: a time for a
    /// pending draft or the number of a listed option.
    async fn continue_dialogue(&mut self, text: &str, now: NaiveDateTime) -> Result<Option<String>> {
        match &self.state {
            DialogueState::AwaitingTime(draft) => {
                let Some(window) = self.extractor_for(draft.duration).extract(text, now) else {
                    return Ok(None);
                };
                let event = Event::new(draft.title.clone(), window).with_location(draft.location.clone());
                Ok(Some(self.propose(PendingAction::Add(event), now).await))
            }
            DialogueState::AwaitingConfirmation { action, suggestions } => {
                let Some(index) = parse_choice(text, suggestions.len()) else {
                    return Ok(None);
                };
                let start = suggestions[index];
                let action = match action {
                    PendingAction::Add(event) => {
                        PendingAction::Add(event.rescheduled(TimeWindow::with_duration(start, event.duration())?))
                    }
                    PendingAction::Reschedule { event, window } => PendingAction::Reschedule {
                        event: event.clone(),
                        window: TimeWindow::with_duration(start, window.duration())?,
                    },
                    PendingAction::Delete(_) => return Ok(None),
                };
                info!("Suggestion {} picked: {}", index + 1, start);
                Ok(Some(self.propose(action, now).await))
            }
            DialogueState::AwaitingEventSelection { candidates, edit } => {
                let Some(index) = parse_choice(text, candidates.len()) else {
                    return Ok(None);
                };
                let event = candidates[index].clone();
                let edit = edit.clone();
                Ok(Some(self.begin_edit(event, edit, now).await))
            }
            DialogueState::Idle => Ok(None),
        }
    }

    fn extractor_for(&self, duration: Option<Duration>) -> TemporalExtractor {
        duration.map(TemporalExtractor::new).unwrap_or(self.extractor)
    }

    async fn handle_add(&mut self, parsed: &ParsedIntent, text: &str, now: NaiveDateTime) -> Result<String> {
        let title = parsed.entity("title").unwrap_or(DEFAULT_TITLE).to_string();
        let location = parsed.entity("location").map(str::to_string);
        let duration = parsed
            .entity("duration_minutes")
            .and_then(|m| m.parse::<i64>().ok())
            .filter(|m| *m > 0)
            .map(Duration::minutes);

        match self.extractor_for(duration).extract(text, now) {
            Some(window) => {
                let event = Event::new(title, window).with_location(location);
                Ok(self.propose(PendingAction::Add(event), now).await)
            }
            None => {
                let reply = format!(
                    "请告诉我事件的时间，例如：“明天下午3点”。当前解析的标题是：{}，地点：{}",
                    title,
                    location.as_deref().unwrap_or("未指定")
                );
                self.state = DialogueState::AwaitingTime(PendingDraft { title, location, duration });
                Ok(reply)
            }
        }
    }

    /// Check an add or reschedule against the calendar and ask for confirmation.
    async fn propose(&mut self, action: PendingAction, now: NaiveDateTime) -> String {
        let target = action.target();
        let headline = match &action {
            PendingAction::Add(_) => "即将添加事件：".to_string(),
            PendingAction::Reschedule { event, .. } => format!("即将把事件“{}”改到新的时间：", event.title),
            PendingAction::Delete(_) => "即将删除事件：".to_string(),
        };
        if let PendingAction::Delete(_) = action {
            let reply = format!("{}\n{}\n确认吗？", headline, describe(&target));
            self.state = DialogueState::AwaitingConfirmation { action, suggestions: Vec::new() };
            return reply;
        }

        let report = match self.resolver.check(&target, SuggestionQuery::new(now)).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Conflict check for '{}' failed: {}", target.title, e);
                self.state = DialogueState::Idle;
                return format!("无法检查日程冲突：{}。请稍后再试。", e);
            }
        };

        let mut reply = format!("{}\n{}\n", headline, describe(&target));
        if report.is_clear() {
            reply.push_str("确认吗？");
        } else {
            reply.push_str("时间冲突，已有以下安排：\n");
            for conflict in &report.conflicts {
                let _ = writeln!(reply, "  - {}", conflict);
            }
            if report.suggestions.is_empty() {
                reply.push_str("附近没有空闲时间。");
            } else {
                reply.push_str("可选的其他时间：\n");
                for (i, start) in report.suggestions.iter().enumerate() {
                    let _ = writeln!(reply, "  {}. {}", i + 1, format_time(*start));
                }
                reply.push_str("回复序号选择其他时间，");
            }
            reply.push_str("回复“确认”仍按原时间保存，或回复“取消”。");
        }
        self.state = DialogueState::AwaitingConfirmation { action, suggestions: report.suggestions };
        reply
    }

    async fn handle_edit(&mut self, parsed: &ParsedIntent, text: &str, now: NaiveDateTime) -> Result<String> {
        let deleting = parsed.intent == IntentKind::DeleteEvent;
        let verb = if deleting { "删除" } else { "修改" };
        let Some(fragment) = parsed.entity("title").filter(|t| *t != DEFAULT_TITLE) else {
            return Ok(format!("请告诉我要{}哪个事件，例如：“{}明天的周会”。", verb, verb));
        };

        let edit = if deleting {
            PendingEdit::Delete
        } else {
            if self.extractor.extract(text, now).is_none() {
                return Ok(format!("请告诉我“{}”的新时间，例如：“把{}改到明天下午3点”。", fragment, fragment));
            }
            PendingEdit::Reschedule { request: text.to_string(), requested_at: now }
        };

        let from = start_of_day(now.date())?;
        let mut matches = match self.store.list_events(from, from + Duration::days(LOOKAHEAD_DAYS)).await {
            Ok(events) => events,
            Err(e) => return Ok(format!("读取日程失败：{}", e)),
        };
        matches.retain(|e| e.title.contains(fragment));
        debug!("{} events match '{}'", matches.len(), fragment);

        match matches.len() {
            0 => Ok(format!("未来{}天内没有找到标题包含“{}”的事件。", LOOKAHEAD_DAYS, fragment)),
            1 => {
                let event = matches.remove(0);
                Ok(self.begin_edit(event, edit, now).await)
            }
            _ => {
                let reply = format!(
                    "找到多个匹配的事件，请回复序号选择要{}的事件：\n{}",
                    verb,
                    numbered_events(&matches, "%m-%d %H:%M")
                );
                self.state = DialogueState::AwaitingEventSelection { candidates: matches, edit };
                Ok(reply)
            }
        }
    }

    async fn begin_edit(&mut self, event: Event, edit: PendingEdit, now: NaiveDateTime) -> String {
        match edit {
            PendingEdit::Delete => self.propose(PendingAction::Delete(event), now).await,
            PendingEdit::Reschedule { request, requested_at } => {
                match TemporalExtractor::new(event.duration()).extract(&request, requested_at) {
                    Some(window) => self.propose(PendingAction::Reschedule { event, window }, now).await,
                    None => {
                        self.state = DialogueState::Idle;
                        format!("没能从“{}”中识别出新的时间。", request)
                    }
                }
            }
        }
    }

    async fn handle_query(&mut self, text: &str, now: NaiveDateTime) -> Result<String> {
        let date = extract_date(text, now).unwrap_or_else(|| now.date());
        let from = start_of_day(date)?;
        let to = from + Duration::days(1);
        let events = match self.store.list_events(from, to).await {
            Ok(events) => events,
            Err(e) => return Ok(format!("读取日程失败：{}", e)),
        };
        // intersecting events include ones ending exactly at midnight
        let events: Vec<Event> = events.into_iter().filter(|e| e.end > from && e.start < to).collect();

        if events.is_empty() {
            return Ok(format!("{} 没有安排事件。", date.format("%Y-%m-%d")));
        }
        Ok(format!("{} 的安排：\n{}", date.format("%Y-%m-%d"), numbered_events(&events, "%H:%M")))
    }

    async fn handle_list(&mut self, now: NaiveDateTime) -> Result<String> {
        let events = match self.store.list_events(now, now + Duration::days(LOOKAHEAD_DAYS)).await {
            Ok(events) => events,
            Err(e) => return Ok(format!("读取日程失败：{}", e)),
        };
        if events.is_empty() {
            return Ok(format!("未来{}天内没有安排事件。", LOOKAHEAD_DAYS));
        }
        Ok(format!("未来{}天的安排：\n{}", LOOKAHEAD_DAYS, numbered_events(&events, "%m-%d %H:%M")))
    }

    async fn handle_confirm(&mut self) -> Result<String> {
        let action = match std::mem::take(&mut self.state) {
            DialogueState::AwaitingConfirmation { action, .. } => action,
            other => {
                self.state = other;
                return Ok("没有待确认的操作。".to_string());
            }
        };

        let reply = match action {
            PendingAction::Add(event) => {
                match self.store.add_event(event.clone()).await {
                    Ok(()) => {
                        info!("Added event {} '{}' at {}", event.id, event.title, event.start);
                        format!("事件“{}”已成功添加！", event.title)
                    }
                    Err(e) => format!("添加事件失败：{}", e),
                }
            }
            PendingAction::Reschedule { event, window } => {
                match self.store.update_event(event.rescheduled(window)).await {
                    Ok(()) => {
                        info!("Moved event {} to {}", event.id, window);
                        format!("事件“{}”已改到 {}。", event.title, window)
                    }
                    Err(e) => format!("修改事件失败：{}", e),
                }
            }
            PendingAction::Delete(event) => match self.store.remove_event(&event.id).await {
                Ok(removed) => {
                    info!("Removed event {} '{}'", removed.id, removed.title);
                    format!("事件“{}”已删除。", removed.title)
                }
                Err(e) => format!("删除事件失败：{}", e),
            },
        };
        Ok(reply)
    }

    fn handle_cancel(&mut self) -> String {
        if self.state.is_idle() {
            return "没有需要取消的操作。".to_string();
        }
        self.state = DialogueState::Idle;
        "已取消。".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::MemoryEventStore;
    use crate::parser::KeywordClassifier;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn agent(store: Arc<MemoryEventStore>) -> CalendarAgent {
        CalendarAgent::new(store, Box::new(KeywordClassifier::new()), AgentSettings::default())
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut agent = agent(Arc::new(MemoryEventStore::new()));
        assert_eq!(agent.process_input("  \u{7} ", now()).await.unwrap(), EMPTY_INPUT_REPLY);
    }

    #[tokio::test]
    async fn test_confirm_without_pending_action() {
        let mut agent = agent(Arc::new(MemoryEventStore::new()));
        let reply = agent.process_input("确认", now()).await.unwrap();
        assert_eq!(reply, "没有待确认的操作。");
        assert!(agent.state().is_idle());
    }

    #[tokio::test]
    async fn test_add_waits_for_confirmation() {
        let store = Arc::new(MemoryEventStore::new());
        let mut agent = agent(store.clone());

        let reply = agent.process_input("明天下午3点开会", now()).await.unwrap();
        assert!(reply.contains("即将添加事件"), "{}", reply);
        assert!(matches!(agent.state(), DialogueState::AwaitingConfirmation { .. }));
        assert!(store.is_empty().await);

        agent.process_input("确认", now()).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert!(agent.state().is_idle());
    }

    #[tokio::test]
    async fn test_help() {
        let mut agent = agent(Arc::new(MemoryEventStore::new()));
        assert_eq!(agent.process_input("help", now()).await.unwrap(), HELP_TEXT);
    }
}
