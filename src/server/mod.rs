//! HTTP surface.
//!
//! - `GET /{feed_id}`: anonymous filtered feed ([`public`])
//! - `/api/...`: bearer-protected admin API ([`admin`], guarded by [`auth`])

pub mod admin;
pub mod auth;
pub mod error;
pub mod public;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub use auth::AdminAuth;
pub use error::ApiError;

use crate::model::FeedDefinition;
use crate::proxy::FeedProxy;
use crate::storage::Database;

/// Shared, read-only state for all handlers.
#[derive(Debug)]
pub struct AppState {
    pub db: Database,
    pub proxy: FeedProxy,
    pub auth: AdminAuth,
}

impl AppState {
    pub fn new(db: Database, proxy: FeedProxy, auth: AdminAuth) -> Self {
        Self { db, proxy, auth }
    }

    /// Rejects feed URLs the fetcher would refuse anyway, before they are stored.
    fn validate(&self, definition: &FeedDefinition) -> Result<(), ApiError> {
        self.proxy.options().url_policy.validate(&definition.url)?;
        Ok(())
    }
}

/// Builds the application router.
///
/// A feed whose id is `api` is shadowed by the admin routes.
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/feeds", get(admin::list_feeds).post(admin::save_feeds))
        .route(
            "/feeds/{feed_id}",
            get(admin::get_feed)
                .post(admin::save_feed)
                .delete(admin::delete_feed),
        )
        .route("/feeds/{feed_id}/test", post(admin::test_saved_feed))
        .route("/test", post(admin::test_definition))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .nest("/api", admin)
        .route("/{feed_id}", get(public::serve_feed))
        .with_state(state)
}
