use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::rule::Rule;
use super::UnknownVariant;

/// What happens to an entry once a rule (or the feed default) decides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    /// Leave the entry untouched.
    Accept,
    /// Remove the entry from the feed.
    Reject,
    /// Prefix the entry title with the promote marker.
    Promote,
    /// Prefix the entry title with the demote marker.
    Demote,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
            Decision::Promote => "promote",
            Decision::Demote => "demote",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Decision::Accept),
            "reject" => Ok(Decision::Reject),
            "promote" => Ok(Decision::Promote),
            "demote" => Ok(Decision::Demote),
            other => Err(UnknownVariant {
                kind: "decision",
                value: other.to_string(),
            }),
        }
    }
}

/// The filtering-relevant part of a feed: everything except identity and timestamps.
///
/// This is both the body of an upsert and the input of [`crate::filter::filter_feed`],
/// so an unsaved definition can be tested before it is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDefinition {
    pub description: String,
    pub url: String,
    pub default_decision: Decision,
    /// Evaluated in list order; the first matching rule decides.
    pub rules: Vec<Rule>,
}

impl FeedDefinition {
    /// Returns the first rule index that occurs more than once, if any.
    ///
    /// Storage keys rules by `(feed_id, index)`, so duplicates cannot be saved.
    pub fn duplicate_rule_index(&self) -> Option<i32> {
        let mut seen = std::collections::HashSet::new();
        self.rules
            .iter()
            .map(Rule::index)
            .find(|index| !seen.insert(*index))
    }
}

/// A [`FeedDefinition`] carrying its target id, used by the bulk upsert endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDefinitionWithId {
    pub feed_id: String,
    #[serde(flatten)]
    pub definition: FeedDefinition,
}

/// A stored feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub feed_id: String,
    #[serde(flatten)]
    pub definition: FeedDefinition,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemField, RuleConfig, TestType};

    fn rule(index: i32) -> Rule {
        Rule::new(RuleConfig {
            index,
            field: ItemField::Title,
            custom_xpath: None,
            tested_attribute_name: None,
            test_type: TestType::Contains,
            test_expression: "x".to_string(),
            decision: Decision::Reject,
            comment: None,
        })
        .unwrap()
    }

    #[test]
    fn test_decision_round_trips_through_str() {
        for decision in [
            Decision::Accept,
            Decision::Reject,
            Decision::Promote,
            Decision::Demote,
        ] {
            assert_eq!(decision.as_str().parse::<Decision>().unwrap(), decision);
        }
    }

    #[test]
    fn test_unknown_decision_rejected() {
        let err = "boost".parse::<Decision>().unwrap_err();
        assert_eq!(err.kind, "decision");
        assert!(err.to_string().contains("boost"));
    }

    #[test]
    fn test_feed_json_is_flat_camel_case() {
        let json = r#"{
            "feedId": "news",
            "description": "News",
            "url": "https://example.com/feed",
            "defaultDecision": "accept",
            "rules": [],
            "dateCreated": "2024-01-01T00:00:00Z",
            "dateUpdated": "2024-01-02T00:00:00Z"
        }"#;
        let feed: Feed = serde_json::from_str(json).unwrap();
        assert_eq!(feed.feed_id, "news");
        assert_eq!(feed.definition.default_decision, Decision::Accept);

        let value = serde_json::to_value(&feed).unwrap();
        assert_eq!(value["defaultDecision"], "accept");
        assert_eq!(value["url"], "https://example.com/feed");
    }

    #[test]
    fn test_unknown_default_decision_fails_deserialization() {
        let json = r#"{"description":"","url":"https://e.com","defaultDecision":"maybe","rules":[]}"#;
        assert!(serde_json::from_str::<FeedDefinition>(json).is_err());
    }

    #[test]
    fn test_duplicate_rule_index_detected() {
        let mut definition = FeedDefinition {
            description: String::new(),
            url: "https://example.com".to_string(),
            default_decision: Decision::Accept,
            rules: vec![rule(0), rule(2)],
        };
        assert_eq!(definition.duplicate_rule_index(), None);

        definition.rules.push(rule(2));
        assert_eq!(definition.duplicate_rule_index(), Some(2));
    }
}
