//! `/api` handlers: feed CRUD and dry-run filtering.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use super::error::ApiError;
use super::AppState;
use crate::model::{Feed, FeedDefinition, FeedDefinitionWithId, FeedFilteringResult};

// ============================================================================
// Feeds
// ============================================================================

pub async fn list_feeds(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Feed>>, ApiError> {
    Ok(Json(state.db.list_feeds().await?))
}

/// Upserts every definition in order, then returns all feeds.
///
/// Definitions are validated up front so a bad entry late in the list does
/// not leave earlier ones half-applied.
pub async fn save_feeds(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<FeedDefinitionWithId>>, JsonRejection>,
) -> Result<Json<Vec<Feed>>, ApiError> {
    let Json(updates) = payload?;
    for update in &updates {
        state.validate(&update.definition)?;
    }
    for update in &updates {
        state.db.save_feed(&update.feed_id, &update.definition).await?;
    }
    Ok(Json(state.db.list_feeds().await?))
}

pub async fn get_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Result<Json<Feed>, ApiError> {
    Ok(Json(state.db.get_required_feed(&feed_id).await?))
}

pub async fn save_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
    payload: Result<Json<FeedDefinition>, JsonRejection>,
) -> Result<Json<Feed>, ApiError> {
    let Json(definition) = payload?;
    state.validate(&definition)?;
    Ok(Json(state.db.save_feed(&feed_id, &definition).await?))
}

pub async fn delete_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.db.delete_feed(&feed_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Test
// ============================================================================

/// Filters the live upstream feed with an unsaved definition.
pub async fn test_definition(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FeedDefinition>, JsonRejection>,
) -> Result<Json<FeedFilteringResult>, ApiError> {
    let Json(definition) = payload?;
    state.validate(&definition)?;
    Ok(Json(state.proxy.test(&definition).await?))
}

/// Filters the live upstream feed with the stored definition.
pub async fn test_saved_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
) -> Result<Json<FeedFilteringResult>, ApiError> {
    let feed = state.db.get_required_feed(&feed_id).await?;
    Ok(Json(state.proxy.test(&feed.definition).await?))
}
