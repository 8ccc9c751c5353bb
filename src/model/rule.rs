use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::feed::Decision;
use super::UnknownVariant;
use crate::filter::{Locator, LocatorError};

/// The part of an entry a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemField {
    Title,
    Author,
    Link,
    Category,
    Content,
    /// Located by the rule's own `custom_xpath`.
    Custom,
}

impl ItemField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemField::Title => "title",
            ItemField::Author => "author",
            ItemField::Link => "link",
            ItemField::Category => "category",
            ItemField::Content => "content",
            ItemField::Custom => "custom",
        }
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemField {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(ItemField::Title),
            "author" => Ok(ItemField::Author),
            "link" => Ok(ItemField::Link),
            "category" => Ok(ItemField::Category),
            "content" => Ok(ItemField::Content),
            "custom" => Ok(ItemField::Custom),
            other => Err(UnknownVariant {
                kind: "field",
                value: other.to_string(),
            }),
        }
    }
}

/// String predicate applied to each resolved field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestType {
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    /// Case-insensitive, unanchored search.
    Regex,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Exact => "exact",
            TestType::Contains => "contains",
            TestType::StartsWith => "startsWith",
            TestType::EndsWith => "endsWith",
            TestType::Regex => "regex",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(TestType::Exact),
            "contains" => Ok(TestType::Contains),
            "startsWith" => Ok(TestType::StartsWith),
            "endsWith" => Ok(TestType::EndsWith),
            "regex" => Ok(TestType::Regex),
            other => Err(UnknownVariant {
                kind: "test type",
                value: other.to_string(),
            }),
        }
    }
}

/// Errors raised while compiling a [`RuleConfig`] into a [`Rule`].
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule {index}: invalid regex: {source}")]
    Regex {
        index: i32,
        #[source]
        source: regex::Error,
    },
    #[error("Rule {index}: invalid custom locator: {source}")]
    Locator {
        index: i32,
        #[source]
        source: LocatorError,
    },
}

/// The plain, serializable shape of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Display/reference id. Evaluation order is list order, not this value.
    pub index: i32,
    pub field: ItemField,
    /// Locator used when `field` is [`ItemField::Custom`].
    #[serde(
        rename = "customXPath",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_xpath: Option<String>,
    /// Test this attribute of the located element instead of its text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tested_attribute_name: Option<String>,
    pub test_type: TestType,
    pub test_expression: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A compiled rule.
///
/// Regex expressions and custom locators are compiled once in [`Rule::new`]
/// and reused for every entry. A `Custom` rule without a locator is still
/// constructible; the engine reports it when the rule is evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RuleConfig", into = "RuleConfig")]
pub struct Rule {
    config: RuleConfig,
    regex: Option<Regex>,
    locator: Option<Locator>,
}

impl Rule {
    pub fn new(config: RuleConfig) -> Result<Self, RuleError> {
        let regex = match config.test_type {
            TestType::Regex => Some(
                RegexBuilder::new(&config.test_expression)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RuleError::Regex {
                        index: config.index,
                        source,
                    })?,
            ),
            _ => None,
        };

        // An empty locator counts as missing, same as an absent one.
        let locator = match config.custom_xpath.as_deref().map(str::trim) {
            Some(source) if !source.is_empty() => {
                Some(source.parse::<Locator>().map_err(|source| RuleError::Locator {
                    index: config.index,
                    source,
                })?)
            }
            _ => None,
        };

        Ok(Self {
            config,
            regex,
            locator,
        })
    }

    /// Tests one candidate value against this rule's predicate.
    pub fn matches(&self, value: &str) -> bool {
        let expression = self.config.test_expression.as_str();
        match self.config.test_type {
            TestType::Exact => value == expression,
            TestType::Contains => value.contains(expression),
            TestType::StartsWith => value.starts_with(expression),
            TestType::EndsWith => value.ends_with(expression),
            TestType::Regex => self
                .regex
                .as_ref()
                .is_some_and(|regex| regex.is_match(value)),
        }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn index(&self) -> i32 {
        self.config.index
    }

    pub fn field(&self) -> ItemField {
        self.config.field
    }

    /// The compiled custom locator, if one was configured.
    pub fn custom_locator(&self) -> Option<&Locator> {
        self.locator.as_ref()
    }

    pub fn tested_attribute_name(&self) -> Option<&str> {
        self.config.tested_attribute_name.as_deref()
    }

    pub fn test_type(&self) -> TestType {
        self.config.test_type
    }

    pub fn test_expression(&self) -> &str {
        &self.config.test_expression
    }

    pub fn decision(&self) -> Decision {
        self.config.decision
    }

    pub fn comment(&self) -> Option<&str> {
        self.config.comment.as_deref()
    }
}

impl TryFrom<RuleConfig> for Rule {
    type Error = RuleError;

    fn try_from(config: RuleConfig) -> Result<Self, Self::Error> {
        Rule::new(config)
    }
}

impl From<Rule> for RuleConfig {
    fn from(rule: Rule) -> Self {
        rule.config
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config
    }
}
