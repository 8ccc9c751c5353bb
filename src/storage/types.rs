use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Decision, Feed, FeedDefinition, ItemField, Rule, RuleConfig, TestType};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database
    #[error("The database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// No feed with this id exists
    #[error("Feed '{0}' not found")]
    FeedNotFound(String),

    /// Rules are keyed by `(feed_id, index)`
    #[error("Rule index {0} is used more than once")]
    DuplicateRuleIndex(i32),

    /// A stored value no longer parses (unknown enum value, bad regex, bad timestamp)
    #[error("Stored data is invalid: {0}")]
    Corrupt(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for the `feeds` table
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub feed_id: String,
    pub description: String,
    pub url: String,
    pub default_decision: String,
    pub date_created: i64,
    pub date_updated: i64,
}

impl FeedRow {
    pub fn into_feed(self, rules: Vec<Rule>) -> Result<Feed, DatabaseError> {
        let default_decision = self
            .default_decision
            .parse::<Decision>()
            .map_err(|e| corrupt(&self.feed_id, e))?;
        Ok(Feed {
            date_created: from_millis(&self.feed_id, self.date_created)?,
            date_updated: from_millis(&self.feed_id, self.date_updated)?,
            feed_id: self.feed_id,
            definition: FeedDefinition {
                description: self.description,
                url: self.url,
                default_decision,
                rules,
            },
        })
    }
}

/// Internal row type for the `rules` table
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RuleRow {
    pub feed_id: String,
    pub idx: i32,
    pub field: String,
    pub custom_xpath: Option<String>,
    pub tested_attribute_name: Option<String>,
    pub test_type: String,
    pub test_expression: String,
    pub decision: String,
    pub comment: Option<String>,
}

impl RuleRow {
    /// Recompiles the stored rule; anything that no longer parses is corruption.
    pub fn into_rule(self) -> Result<Rule, DatabaseError> {
        let feed_id = self.feed_id;
        let config = RuleConfig {
            index: self.idx,
            field: self.field.parse::<ItemField>().map_err(|e| corrupt(&feed_id, e))?,
            custom_xpath: self.custom_xpath,
            tested_attribute_name: self.tested_attribute_name,
            test_type: self.test_type.parse::<TestType>().map_err(|e| corrupt(&feed_id, e))?,
            test_expression: self.test_expression,
            decision: self.decision.parse::<Decision>().map_err(|e| corrupt(&feed_id, e))?,
            comment: self.comment,
        };
        Rule::new(config).map_err(|e| corrupt(&feed_id, e))
    }
}

fn corrupt(feed_id: &str, err: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Corrupt(format!("feed '{feed_id}': {err}"))
}

fn from_millis(feed_id: &str, millis: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| corrupt(feed_id, format!("timestamp {millis} out of range")))
}
