//! Natural language parsing module
//!
//! Temporal extraction and intent classification for conversational scheduling
//! requests.

pub mod intent;
pub mod numerals;
pub mod time_extractor;

pub use intent::{
    extract_location, extract_title, FallbackClassifier, IntentClassifier, IntentKind,
    KeywordClassifier, ParsedIntent,
};
pub use time_extractor::{extract_date, extract_datetime, DayPeriod, TemporalExtractor};

/// Helper functions shared across NL parsers
pub mod utils {
    /// Sanitize user input: drop control characters except newlines and tabs
    pub fn sanitize_user_input(input: &str) -> String {
        input
            .chars()
            .filter(|&c| !c.is_control() || c == '\n' || c == '\t')
            .collect::<String>()
            .trim()
            .to_string()
    }

}
