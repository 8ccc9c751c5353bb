use serde::Serialize;

use super::feed::{Decision, FeedDefinition};
use super::rule::Rule;

/// Outcome of one filtering pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFilteringResult {
    pub feed: FeedDefinition,
    pub original_xml: String,
    pub filtered_xml: String,
    pub entry_results: Vec<EntryFilteringResult>,
}

/// Audit record for a single entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFilteringResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_title: Option<String>,
    /// `None` when the feed's default decision applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deciding_rule: Option<Rule>,
    /// The values tested against `deciding_rule`; `None` when no rule matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tested_values: Option<Vec<String>>,
    pub decision: Decision,
}
