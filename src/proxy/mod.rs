//! Upstream retrieval and the serve/test paths built on it.
//!
//! - [`fetcher`]: bounded HTTP GET with conditional headers and manual redirects
//! - [`pipeline`]: [`FeedProxy`], fetch + filter for the public and admin endpoints

pub mod fetcher;
pub mod pipeline;

pub use fetcher::{
    build_client, fetch_upstream, CacheHeaders, ConditionalRequest, FetchError, FetchOptions,
    UpstreamResponse, USER_AGENT,
};
pub use pipeline::{FeedProxy, ProxyError, ProxyResponse, ERROR_BODY};
