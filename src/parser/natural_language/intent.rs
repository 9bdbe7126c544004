//! Intent classification for conversational input
//!
//! The language-model classifier lives outside this crate and plugs in through
//! [`IntentClassifier`]. [`KeywordClassifier`] is the keyword fallback used when
//! no model is configured or the model call fails.

use super::time_extractor::parse_duration;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_TITLE: &str = "未命名事件";

/// What the user wants done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    AddEvent,
    ModifyEvent,
    DeleteEvent,
    QueryEvents,
    ListEvents,
    ConfirmAction,
    CancelAction,
    Help,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntentKind::AddEvent => "add_event",
            IntentKind::ModifyEvent => "modify_event",
            IntentKind::DeleteEvent => "delete_event",
            IntentKind::QueryEvents => "query_events",
            IntentKind::ListEvents => "list_events",
            IntentKind::ConfirmAction => "confirm_action",
            IntentKind::CancelAction => "cancel_action",
            IntentKind::Help => "help",
        };
        f.write_str(name)
    }
}

/// Structured classifier output: intent, entity map and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    #[serde(rename = "intent_type")]
    pub intent: IntentKind,
    #[serde(default)]
    pub entities: HashMap<String, String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub original_text: String,
}

fn default_confidence() -> f32 {
    0.5
}

impl ParsedIntent {
    pub fn new(intent: IntentKind, confidence: f32, original_text: &str) -> Self {
        let mut entities = HashMap::new();
        entities.insert("raw_text".to_string(), original_text.to_string());
        Self { intent, entities, confidence, original_text: original_text.to_string() }
    }

    pub fn with_entity(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.entities.insert(key.to_string(), value);
        }
        self
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }
}

/// Classifier turning user text into a [`ParsedIntent`]
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<ParsedIntent>;
}

const CONFIRM_REPLIES: &[&str] = &["确认", "确定", "好的", "好", "是的", "是", "可以", "行", "yes", "y", "ok"];
const CANCEL_REPLIES: &[&str] = &["取消", "算了", "不要", "不用了", "不", "否", "no", "n"];
const HELP_WORDS: &[&str] = &["帮助", "怎么用", "help"];
const DELETE_WORDS: &[&str] = &["删除", "删掉"];
const EVENT_NOUNS: &[&str] = &["会", "活动", "日程", "事件", "约会", "安排"];
const MODIFY_WORDS: &[&str] = &["修改", "更改", "更新", "改到", "改成", "推迟", "提前", "挪到"];
const QUERY_WORDS: &[&str] = &["什么", "哪些", "有没有", "查询", "查看", "查一下"];
const LIST_WORDS: &[&str] = &["列出", "显示", "所有", "全部", "本周", "这周"];
const ADD_WORDS: &[&str] =
    &["添加", "新建", "安排", "创建", "预约", "会议", "讨论会", "约会", "开会", "见面", "讲座", "培训"];

/// Words stripped from the text when deriving a title.
const COMMAND_WORDS: &[&str] = &[
    "帮我", "请", "我要", "我想", "添加", "新建", "安排", "创建", "预约", "一个", "一下", "修改", "更改",
    "更新", "删除", "删掉", "取消", "推迟", "提前", "改到", "改成", "挪到", "把",
];

static TIME_NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    let words = super::numerals::NUMERAL_ALTERNATION.as_str();
    Regex::new(&format!(
        r"今天|今早|今晚|明天|明早|明晚|后天|早上|上午|早晨|清晨|凌晨|中午|下午|晚上|傍晚|夜里|\d{{1,2}}[:：]\d{{2}}|(?:\d{{1,2}}|{words})\s*[点时](?:半|一刻|三刻|\d{{1,2}}分?)?|(?:\d{{1,2}}月)?\d{{1,2}}[号日]|(?:\d{{1,2}}|{words})\s*个?半?(?:小时|钟头)|半个?小时|\d{{1,3}}分钟",
        words = words
    ))
    .unwrap()
});

static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[在于](?P<place>[^，。,！？\s在于]{1,20}?(?:教室|会议室|办公室|礼堂|食堂|大厅|餐厅))").unwrap()
});

static LABELLED_LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"地点[:：是为]?\s*(?P<place>[^，。,！？\s]+)").unwrap());

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Reply normalised for exact matching: trimmed, lowercase, no trailing punctuation.
fn normalized_reply(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| "。！!.？?，,~".contains(c))
        .to_lowercase()
}

/// Place named in the text (`在3楼会议室`, `地点：图书馆`).
pub fn extract_location(text: &str) -> Option<String> {
    LOCATION_RE
        .captures(text)
        .or_else(|| LABELLED_LOCATION_RE.captures(text))
        .and_then(|caps| caps.name("place"))
        .map(|m| m.as_str().trim().to_string())
        .filter(|place| !place.is_empty())
}

/// Event title: the text with time expressions, command words and the place removed.
pub fn extract_title(text: &str) -> String {
    let mut title = TIME_NOISE_RE.replace_all(text, " ").into_owned();
    if let Some(range) = LOCATION_RE.find(&title).map(|m| m.range()) {
        title.replace_range(range, " ");
    }
    for word in COMMAND_WORDS {
        title = title.replace(word, " ");
    }
    let title: String = title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| "的在到至-~，。！？,.!? ".contains(c))
        .to_string();
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

/// Keyword-based fallback classifier
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_text(&self, text: &str) -> ParsedIntent {
        let reply = normalized_reply(text);
        let lower = text.to_lowercase();

        let parsed = if CONFIRM_REPLIES.contains(&reply.as_str()) {
            ParsedIntent::new(IntentKind::ConfirmAction, 0.95, text)
        } else if CANCEL_REPLIES.contains(&reply.as_str()) {
            ParsedIntent::new(IntentKind::CancelAction, 0.95, text)
        } else if contains_any(&lower, HELP_WORDS) {
            ParsedIntent::new(IntentKind::Help, 0.8, text)
        } else if contains_any(text, DELETE_WORDS)
            || (text.contains("取消") && contains_any(text, EVENT_NOUNS))
        {
            ParsedIntent::new(IntentKind::DeleteEvent, 0.7, text).with_entity("title", extract_title(text))
        } else if contains_any(text, MODIFY_WORDS) {
            ParsedIntent::new(IntentKind::ModifyEvent, 0.7, text).with_entity("title", extract_title(text))
        } else if contains_any(text, QUERY_WORDS) {
            ParsedIntent::new(IntentKind::QueryEvents, 0.7, text)
        } else if contains_any(text, LIST_WORDS) {
            ParsedIntent::new(IntentKind::ListEvents, 0.7, text)
        } else if contains_any(text, ADD_WORDS) {
            let mut parsed = ParsedIntent::new(IntentKind::AddEvent, 0.8, text)
                .with_entity("title", extract_title(text))
                .with_entity("location", extract_location(text).unwrap_or_default());
            if let Some(duration) = parse_duration(text) {
                parsed = parsed.with_entity("duration_minutes", duration.num_minutes().to_string());
            }
            parsed
        } else {
            ParsedIntent::new(IntentKind::QueryEvents, 0.6, text)
        };

        debug!("Keyword classifier: '{}' -> {} ({:.2})", text, parsed.intent, parsed.confidence);
        parsed
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<ParsedIntent> {
        Ok(self.classify_text(text))
    }
}

/// Tries a primary classifier and falls back to keywords when it fails.
pub struct FallbackClassifier {
    primary: Box<dyn IntentClassifier>,
    fallback: KeywordClassifier,
}

impl FallbackClassifier {
    pub fn new(primary: Box<dyn IntentClassifier>) -> Self {
        Self { primary, fallback: KeywordClassifier::new() }
    }
}

#[async_trait]
impl IntentClassifier for FallbackClassifier {
    async fn classify(&self, text: &str) -> Result<ParsedIntent> {
        match self.primary.classify(text).await {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                warn!("Primary intent classifier failed, using keyword fallback: {}", e);
                Ok(self.fallback.classify_text(text))
            }
        }
    }
}
