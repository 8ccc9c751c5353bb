use thiserror::Error;
use tracing::{debug, error, info};

use super::fetcher::{
    fetch_upstream, CacheHeaders, ConditionalRequest, FetchError, FetchOptions, UpstreamResponse,
};
use crate::filter::{filter_feed, FilterError};
use crate::model::{FeedDefinition, FeedFilteringResult};

/// Body of the public endpoint when anything goes wrong.
pub const ERROR_BODY: &str = "FeedFilter error";

const DEFAULT_MEDIA_TYPE: &str = "application/xml";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// The upstream answered with something other than 200.
    #[error("Upstream returned HTTP {0}")]
    UpstreamStatus(u16),
}

/// What the public endpoint sends back to the feed reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub cache: CacheHeaders,
    pub body: Option<String>,
}

impl ProxyResponse {
    fn not_modified(cache: CacheHeaders) -> Self {
        Self {
            status: 304,
            content_type: None,
            cache,
            body: None,
        }
    }

    fn text(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8".to_string()),
            cache: CacheHeaders::default(),
            body: Some(body),
        }
    }

    fn error() -> Self {
        Self::text(500, ERROR_BODY.to_string())
    }
}

/// Fetches upstream feeds and runs them through the filtering engine.
///
/// Holds the shared HTTP client; cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct FeedProxy {
    client: reqwest::Client,
    options: FetchOptions,
}

impl FeedProxy {
    pub fn new(client: reqwest::Client, options: FetchOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Produces the response for one reader request. Never fails: errors are
    /// logged and answered with a generic 500.
    pub async fn serve(
        &self,
        feed_id: &str,
        definition: &FeedDefinition,
        conditional: &ConditionalRequest,
    ) -> ProxyResponse {
        match self.try_serve(feed_id, definition, conditional).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    feed_id = %feed_id,
                    url = %definition.url,
                    error = %e,
                    "Failed to serve filtered feed"
                );
                ProxyResponse::error()
            }
        }
    }

    async fn try_serve(
        &self,
        feed_id: &str,
        definition: &FeedDefinition,
        conditional: &ConditionalRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let upstream =
            fetch_upstream(&self.client, &definition.url, conditional, &self.options).await?;

        match upstream {
            UpstreamResponse::NotModified { cache } => {
                debug!(feed_id = %feed_id, "Upstream not modified");
                Ok(ProxyResponse::not_modified(cache))
            }
            UpstreamResponse::Status(status) => {
                info!(feed_id = %feed_id, status = status, "Passing through upstream status");
                Ok(ProxyResponse::text(
                    status,
                    format!("Upstream returned HTTP {status}"),
                ))
            }
            UpstreamResponse::Fresh {
                body,
                media_type,
                cache,
            } => {
                let result = filter_feed(definition, &body)?;
                info!(
                    feed_id = %feed_id,
                    entries = result.entry_results.len(),
                    "Filtered feed"
                );
                let media_type = media_type.as_deref().unwrap_or(DEFAULT_MEDIA_TYPE);
                Ok(ProxyResponse {
                    status: 200,
                    content_type: Some(format!("{media_type}; charset=utf-8")),
                    cache,
                    body: Some(result.filtered_xml),
                })
            }
        }
    }

    /// Fetches `definition.url` unconditionally and returns the full audit result.
    ///
    /// Used by the admin test endpoints to try out a definition before saving it.
    pub async fn test(
        &self,
        definition: &FeedDefinition,
    ) -> Result<FeedFilteringResult, ProxyError> {
        let upstream = fetch_upstream(
            &self.client,
            &definition.url,
            &ConditionalRequest::default(),
            &self.options,
        )
        .await?;

        match upstream {
            UpstreamResponse::Fresh { body, .. } => Ok(filter_feed(definition, &body)?),
            UpstreamResponse::NotModified { .. } => Err(ProxyError::UpstreamStatus(304)),
            UpstreamResponse::Status(status) => Err(ProxyError::UpstreamStatus(status)),
        }
    }
}
