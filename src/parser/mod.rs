/// Parser module
///
/// Everything that turns raw user text into structured scheduling input.
pub mod natural_language;

pub use natural_language::{
    extract_datetime, IntentClassifier, IntentKind, KeywordClassifier, ParsedIntent,
    TemporalExtractor,
};
