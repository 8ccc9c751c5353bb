//! Configuration and result types shared by the engine, storage, and HTTP layers.
//!
//! - [`Feed`] / [`FeedDefinition`]: what the admin API stores and the engine reads
//! - [`Rule`]: one field/predicate/decision triple, compiled on construction
//! - [`FeedFilteringResult`]: engine output with a per-entry audit trail

mod feed;
mod result;
mod rule;

pub use feed::{Decision, Feed, FeedDefinition, FeedDefinitionWithId};
pub use result::{EntryFilteringResult, FeedFilteringResult};
pub use rule::{ItemField, Rule, RuleConfig, RuleError, TestType};

/// Error returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
