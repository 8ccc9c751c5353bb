use chrono::Utc;
use sqlx::QueryBuilder;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{DatabaseError, FeedRow, RuleRow};
use crate::model::{Feed, FeedDefinition, Rule};

const FEED_COLUMNS: &str =
    "feed_id, description, url, default_decision, date_created, date_updated";
const RULE_COLUMNS: &str = "feed_id, idx, field, custom_xpath, tested_attribute_name, \
     test_type, test_expression, decision, comment";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// All feeds ordered by id, each with its rules ordered by index.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let feed_rows: Vec<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY feed_id"))
                .fetch_all(&self.pool)
                .await?;
        let rule_rows: Vec<RuleRow> =
            sqlx::query_as(&format!("SELECT {RULE_COLUMNS} FROM rules ORDER BY feed_id, idx"))
                .fetch_all(&self.pool)
                .await?;

        let mut rules_by_feed: HashMap<String, Vec<Rule>> = HashMap::new();
        for row in rule_rows {
            let feed_id = row.feed_id.clone();
            rules_by_feed
                .entry(feed_id)
                .or_default()
                .push(row.into_rule()?);
        }

        feed_rows
            .into_iter()
            .map(|row| {
                let rules = rules_by_feed.remove(&row.feed_id).unwrap_or_default();
                row.into_feed(rules)
            })
            .collect()
    }

    /// The feed with `feed_id`, or `None` if it does not exist.
    pub async fn get_feed(&self, feed_id: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed_row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE feed_id = ?"))
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(feed_row) = feed_row else {
            return Ok(None);
        };

        let rule_rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE feed_id = ? ORDER BY idx"
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        let rules = rule_rows
            .into_iter()
            .map(RuleRow::into_rule)
            .collect::<Result<Vec<_>, _>>()?;

        feed_row.into_feed(rules).map(Some)
    }

    /// Like [`Database::get_feed`], but a missing feed is an error.
    pub async fn get_required_feed(&self, feed_id: &str) -> Result<Feed, DatabaseError> {
        self.get_feed(feed_id)
            .await?
            .ok_or_else(|| DatabaseError::FeedNotFound(feed_id.to_string()))
    }

    /// Creates or replaces the feed `feed_id`, including its full rule list.
    ///
    /// `date_created` is kept for existing feeds; `date_updated` is set to now.
    pub async fn save_feed(
        &self,
        feed_id: &str,
        definition: &FeedDefinition,
    ) -> Result<Feed, DatabaseError> {
        if let Some(index) = definition.duplicate_rule_index() {
            return Err(DatabaseError::DuplicateRuleIndex(index));
        }

        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO feeds (feed_id, description, url, default_decision, date_created, date_updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(feed_id) DO UPDATE SET
                description = excluded.description,
                url = excluded.url,
                default_decision = excluded.default_decision,
                date_updated = excluded.date_updated
        "#,
        )
        .bind(feed_id)
        .bind(&definition.description)
        .bind(&definition.url)
        .bind(definition.default_decision.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM rules WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;

        if !definition.rules.is_empty() {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new(format!("INSERT INTO rules ({RULE_COLUMNS}) "));
            builder.push_values(&definition.rules, |mut b, rule| {
                b.push_bind(feed_id)
                    .push_bind(rule.index())
                    .push_bind(rule.field().as_str())
                    .push_bind(rule.config().custom_xpath.as_deref())
                    .push_bind(rule.tested_attribute_name())
                    .push_bind(rule.test_type().as_str())
                    .push_bind(rule.test_expression())
                    .push_bind(rule.decision().as_str())
                    .push_bind(rule.comment());
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::info!(
            feed_id = %feed_id,
            rules = definition.rules.len(),
            "Saved feed"
        );

        self.get_required_feed(feed_id).await
    }

    /// Deletes the feed and its rules.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::FeedNotFound`] if there is no such feed.
    pub async fn delete_feed(&self, feed_id: &str) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM rules WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM feeds WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(DatabaseError::FeedNotFound(feed_id.to_string()));
        }
        tx.commit().await?;

        tracing::info!(feed_id = %feed_id, "Deleted feed");
        Ok(())
    }
}
