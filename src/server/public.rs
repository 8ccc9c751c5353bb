use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use super::AppState;
use crate::proxy::{ConditionalRequest, ProxyResponse, ERROR_BODY};

const NOT_FOUND_BODY: &str = "Feed not found";

/// `GET /{feed_id}`: the filtered feed, for feed readers.
pub async fn serve_feed(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let feed = match state.db.get_feed(&feed_id).await {
        Ok(Some(feed)) => feed,
        Ok(None) => {
            tracing::info!(feed_id = %feed_id, "Feed not found");
            return (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response();
        }
        Err(e) => {
            tracing::error!(feed_id = %feed_id, error = %e, "Failed to load feed");
            return (StatusCode::INTERNAL_SERVER_ERROR, ERROR_BODY).into_response();
        }
    };

    let conditional = conditional_request(&headers);
    state
        .proxy
        .serve(&feed_id, &feed.definition, &conditional)
        .await
        .into_response()
}

/// Reader validators are forwarded verbatim.
fn conditional_request(headers: &HeaderMap) -> ConditionalRequest {
    let get = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    ConditionalRequest {
        if_modified_since: get(header::IF_MODIFIED_SINCE),
        if_none_match: get(header::IF_NONE_MATCH),
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = match self.body {
            Some(body) => (status, body).into_response(),
            None => status.into_response(),
        };

        let headers = response.headers_mut();
        let mut set = |name: header::HeaderName, value: Option<String>| {
            if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
                headers.insert(name, value);
            }
        };
        set(header::CONTENT_TYPE, self.content_type);
        set(header::LAST_MODIFIED, self.cache.last_modified);
        set(header::ETAG, self.cache.etag);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::CacheHeaders;

    #[test]
    fn test_conditional_headers_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"abc\""));

        let conditional = conditional_request(&headers);
        assert_eq!(
            conditional.if_modified_since.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert_eq!(conditional.if_none_match.as_deref(), Some("\"abc\""));
        assert_eq!(conditional_request(&HeaderMap::new()), ConditionalRequest::default());
    }

    #[test]
    fn test_proxy_response_headers() {
        let response = ProxyResponse {
            status: 200,
            content_type: Some("application/rss+xml; charset=utf-8".to_string()),
            cache: CacheHeaders {
                last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".to_string()),
                etag: Some("\"v1\"".to_string()),
            },
            body: Some("<rss/>".to_string()),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/rss+xml; charset=utf-8"
        );
        assert_eq!(response.headers()[header::ETAG], "\"v1\"");
        assert_eq!(
            response.headers()[header::LAST_MODIFIED],
            "Wed, 21 Oct 2015 07:28:00 GMT"
        );
    }

    #[test]
    fn test_not_modified_has_no_content_type() {
        let response = ProxyResponse {
            status: 304,
            content_type: None,
            cache: CacheHeaders::default(),
            body: None,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
