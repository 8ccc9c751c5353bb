//! Integration tests for the feed repository: save, list, replace, delete.
//!
//! Each test creates its own in-memory SQLite database for isolation.

use feedfilter::model::{
    Decision, FeedDefinition, FeedDefinitionWithId, ItemField, Rule, RuleConfig, TestType,
};
use feedfilter::storage::{Database, DatabaseError};

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn rule(index: i32, field: ItemField, expression: &str, decision: Decision) -> Rule {
    Rule::new(RuleConfig {
        index,
        field,
        custom_xpath: None,
        tested_attribute_name: None,
        test_type: TestType::Contains,
        test_expression: expression.to_string(),
        decision,
        comment: None,
    })
    .unwrap()
}

fn definition(url: &str, rules: Vec<Rule>) -> FeedDefinition {
    FeedDefinition {
        description: format!("Feed at {url}"),
        url: url.to_string(),
        default_decision: Decision::Accept,
        rules,
    }
}

// ============================================================================
// Save / Get
// ============================================================================

#[tokio::test]
async fn test_saved_feed_reads_back_identically() {
    let db = test_db().await;
    let def = definition(
        "https://example.com/a.xml",
        vec![
            rule(0, ItemField::Title, "sponsored", Decision::Reject),
            rule(1, ItemField::Category, "rust", Decision::Promote),
        ],
    );

    db.save_feed("a", &def).await.unwrap();
    let feed = db.get_required_feed("a").await.unwrap();

    assert_eq!(feed.feed_id, "a");
    assert_eq!(feed.definition.url, def.url);
    assert_eq!(feed.definition.description, def.description);
    assert_eq!(feed.definition.rules, def.rules);
}

#[tokio::test]
async fn test_feed_json_from_admin_api_can_be_stored() {
    let db = test_db().await;
    let json = r#"[{
        "feedId": "blog",
        "description": "Blog",
        "url": "https://example.com/atom.xml",
        "defaultDecision": "reject",
        "rules": [{
            "index": 7,
            "field": "custom",
            "customXPath": "atom:category",
            "testedAttributeName": "term",
            "testType": "exact",
            "testExpression": "rust",
            "decision": "accept",
            "comment": "keep rust posts"
        }]
    }]"#;
    let updates: Vec<FeedDefinitionWithId> = serde_json::from_str(json).unwrap();

    for update in &updates {
        db.save_feed(&update.feed_id, &update.definition).await.unwrap();
    }

    let feed = db.get_required_feed("blog").await.unwrap();
    assert_eq!(feed.definition.default_decision, Decision::Reject);
    let stored = &feed.definition.rules[0];
    assert_eq!(stored.index(), 7);
    assert_eq!(stored.field(), ItemField::Custom);
    assert_eq!(stored.tested_attribute_name(), Some("term"));
    assert_eq!(stored.comment(), Some("keep rust posts"));
    assert_eq!(stored.custom_locator().map(|l| l.as_str()), Some("atom:category"));
}

// ============================================================================
// Replace
// ============================================================================

#[tokio::test]
async fn test_resave_with_fewer_rules_drops_the_rest() {
    let db = test_db().await;
    db.save_feed(
        "a",
        &definition(
            "https://example.com/a.xml",
            vec![
                rule(0, ItemField::Title, "x", Decision::Reject),
                rule(1, ItemField::Title, "y", Decision::Reject),
                rule(2, ItemField::Title, "z", Decision::Reject),
            ],
        ),
    )
    .await
    .unwrap();

    db.save_feed("a", &definition("https://example.com/moved.xml", vec![]))
        .await
        .unwrap();

    let feed = db.get_required_feed("a").await.unwrap();
    assert!(feed.definition.rules.is_empty());
    assert_eq!(feed.definition.url, "https://example.com/moved.xml");
}

#[tokio::test]
async fn test_feeds_do_not_share_rules() {
    let db = test_db().await;
    db.save_feed(
        "a",
        &definition(
            "https://example.com/a.xml",
            vec![rule(0, ItemField::Title, "a", Decision::Reject)],
        ),
    )
    .await
    .unwrap();
    db.save_feed(
        "b",
        &definition(
            "https://example.com/b.xml",
            vec![rule(0, ItemField::Author, "b", Decision::Demote)],
        ),
    )
    .await
    .unwrap();

    db.save_feed("a", &definition("https://example.com/a.xml", vec![]))
        .await
        .unwrap();

    let feeds = db.list_feeds().await.unwrap();
    assert_eq!(feeds.len(), 2);
    assert!(feeds[0].definition.rules.is_empty());
    assert_eq!(feeds[1].definition.rules[0].field(), ItemField::Author);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_leaves_other_feeds() {
    let db = test_db().await;
    for id in ["a", "b", "c"] {
        db.save_feed(id, &definition("https://example.com/feed.xml", vec![]))
            .await
            .unwrap();
    }

    db.delete_feed("b").await.unwrap();

    let ids: Vec<_> = db
        .list_feeds()
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.feed_id)
        .collect();
    assert_eq!(ids, ["a", "c"]);
}

#[tokio::test]
async fn test_delete_unknown_feed_is_not_found() {
    let db = test_db().await;
    let err = db.delete_feed("ghost").await.unwrap_err();
    assert!(matches!(err, DatabaseError::FeedNotFound(ref id) if id == "ghost"));
    assert!(err.to_string().contains("ghost"));
}
