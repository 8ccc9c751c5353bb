use encoding_rs::{Encoding, UTF_8};
use futures::StreamExt;
use reqwest::header::{self, HeaderMap};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::util::{UrlPolicy, UrlValidationError};

/// Sent with every upstream request.
pub const USER_AGENT: &str = concat!("feedfilter/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_REDIRECTS: usize = 3;
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving an upstream feed.
///
/// A non-200 upstream status is not an error; it is reported as
/// [`UpstreamResponse::Status`] so callers can pass it through.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// A single request attempt exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// The feed URL is malformed or not allowed
    #[error("Upstream URL rejected: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// The redirect chain is longer than allowed
    #[error("Too many redirects (max {0})")]
    TooManyRedirects(usize),
    /// A redirect `Location` could not be used
    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The body is not valid in its declared (or default UTF-8) encoding
    #[error("Response body is not valid {0}")]
    InvalidEncoding(&'static str),
}

/// Limits applied to every upstream fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per request attempt; each redirect hop gets its own budget.
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
    pub url_policy: UrlPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_body_bytes: MAX_FEED_SIZE,
            url_policy: UrlPolicy::default(),
        }
    }
}

/// Conditional request headers forwarded verbatim from the feed reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalRequest {
    pub if_modified_since: Option<String>,
    pub if_none_match: Option<String>,
}

/// Cache validators returned by the upstream, forwarded back to the reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheHeaders {
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

impl CacheHeaders {
    fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        Self {
            last_modified: get(header::LAST_MODIFIED),
            etag: get(header::ETAG),
        }
    }
}

#[derive(Debug)]
pub enum UpstreamResponse {
    /// 304: the reader's cached copy is still current.
    NotModified { cache: CacheHeaders },
    /// 200 with a body to filter.
    Fresh {
        body: String,
        /// Content-Type without parameters, e.g. `application/rss+xml`.
        media_type: Option<String>,
        cache: CacheHeaders,
    },
    /// Any other final status.
    Status(u16),
}

/// Builds the shared upstream client.
///
/// Redirects are not followed by the client: [`fetch_upstream`] chases them
/// itself so that each hop keeps the conditional headers and the URL policy.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30)) // Close idle connections promptly
        .tcp_keepalive(Duration::from_secs(60)) // TCP keepalive
        .build()
}

/// Fetches `url`, following up to `options.max_redirects` redirects.
///
/// # Errors
///
/// - [`FetchError::InvalidUrl`] - `url` is rejected by the URL policy
/// - [`FetchError::Network`] / [`FetchError::Timeout`] - a request attempt failed
/// - [`FetchError::TooManyRedirects`] / [`FetchError::InvalidRedirect`] - the redirect
///   chain cannot be completed
/// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`] /
///   [`FetchError::InvalidEncoding`] - the 200 body is unusable
pub async fn fetch_upstream(
    client: &reqwest::Client,
    url: &str,
    conditional: &ConditionalRequest,
    options: &FetchOptions,
) -> Result<UpstreamResponse, FetchError> {
    let mut current = options.url_policy.validate(url)?;
    let mut hops = 0;

    loop {
        let response = send(client, &current, conditional, options.timeout).await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(UpstreamResponse::NotModified {
                cache: CacheHeaders::from_headers(response.headers()),
            });
        }

        if status.is_redirection() {
            if let Some(location) = response.headers().get(header::LOCATION) {
                let next = redirect_target(&current, location, options)?;
                hops += 1;
                // Cycles, including a URL redirecting to itself, end at the hop bound.
                if hops > options.max_redirects {
                    return Err(FetchError::TooManyRedirects(options.max_redirects));
                }
                tracing::debug!(
                    from = %current,
                    to = %next,
                    hop = hops,
                    status = status.as_u16(),
                    "Following redirect"
                );
                current = next;
                continue;
            }
        }

        if status != StatusCode::OK {
            return Ok(UpstreamResponse::Status(status.as_u16()));
        }

        let cache = CacheHeaders::from_headers(response.headers());
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let media_type = content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let bytes = tokio::time::timeout(
            options.timeout,
            read_limited_bytes(response, options.max_body_bytes),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;
        let body = decode_body(&bytes, content_type.as_deref())?;

        return Ok(UpstreamResponse::Fresh {
            body,
            media_type,
            cache,
        });
    }
}

async fn send(
    client: &reqwest::Client,
    url: &Url,
    conditional: &ConditionalRequest,
    timeout: Duration,
) -> Result<reqwest::Response, FetchError> {
    let mut request = client.get(url.clone());
    if let Some(value) = &conditional.if_modified_since {
        request = request.header(header::IF_MODIFIED_SINCE, value);
    }
    if let Some(value) = &conditional.if_none_match {
        request = request.header(header::IF_NONE_MATCH, value);
    }

    tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)
}

fn redirect_target(
    current: &Url,
    location: &header::HeaderValue,
    options: &FetchOptions,
) -> Result<Url, FetchError> {
    let location = location
        .to_str()
        .map_err(|_| FetchError::InvalidRedirect("Location header is not ASCII".to_string()))?;
    let next = current
        .join(location)
        .map_err(|e| FetchError::InvalidRedirect(format!("{location}: {e}")))?;
    options
        .url_policy
        .check(&next)
        .map_err(|e| FetchError::InvalidRedirect(format!("{next}: {e}")))?;
    Ok(next)
}

/// Decodes a feed body using its byte order mark, else the Content-Type
/// charset, else UTF-8. Malformed input is an error, not replaced.
fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Result<String, FetchError> {
    let (encoding, bom_length) = match Encoding::for_bom(bytes) {
        Some(found) => found,
        None => (charset_encoding(content_type).unwrap_or(UTF_8), 0),
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_length..])
        .map(|text| text.into_owned())
        .ok_or(FetchError::InvalidEncoding(encoding.name()))
}

fn charset_encoding(content_type: Option<&str>) -> Option<&'static Encoding> {
    let label = content_type?
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"'))?;
    let encoding = Encoding::for_label(label.as_bytes());
    if encoding.is_none() {
        tracing::warn!(charset = %label, "Unknown upstream charset, decoding as UTF-8");
    }
    encoding
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: received fewer bytes than Content-Length
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
