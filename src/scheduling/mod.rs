//! Scheduling engine: conflict detection and alternative-time suggestions.

pub mod conflict_resolver;

pub use conflict_resolver::{
    ConflictReport, ConflictResolver, ResolverSettings, SchedulingError, SuggestionQuery,
};
