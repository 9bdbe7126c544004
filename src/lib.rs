pub mod agent;
pub mod calendar;
pub mod config;
pub mod parser;
pub mod scheduling;
pub mod state;

use env_logger::Env;

/// Initialise `env_logger`, honouring `RUST_LOG` and defaulting to `info`.
pub fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use chrono::Local;
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}

// Re-export commonly used types
pub use agent::{AgentSettings, CalendarAgent, DialogueState};
pub use calendar::{CalendarError, Event, EventStore, MemoryEventStore, StoreError, TimeWindow};
pub use config::Config;
pub use parser::{extract_datetime, TemporalExtractor};
pub use scheduling::{ConflictResolver, ResolverSettings, SchedulingError, SuggestionQuery};
pub use state::JsonEventStore;
