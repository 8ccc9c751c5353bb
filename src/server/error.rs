use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::filter::FilterError;
use crate::proxy::{FetchError, ProxyError};
use crate::storage::DatabaseError;
use crate::util::UrlValidationError;

/// Errors returned by the admin API, rendered as `application/problem+json`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    /// The upstream feed could not be used as-is.
    #[error("{0}")]
    BadGateway(String),
    /// Details are logged, not returned.
    #[error("Internal server error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct Problem<'a> {
    title: &'a str,
    status: u16,
    detail: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let problem = Problem {
            title: status.canonical_reason().unwrap_or("Error"),
            status: status.as_u16(),
            detail: self.to_string(),
        };
        let mut response = (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(problem),
        )
            .into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::FeedNotFound(id) => ApiError::NotFound(format!("Feed '{id}' not found")),
            DatabaseError::DuplicateRuleIndex(_) => ApiError::BadRequest(err.to_string()),
            other => {
                tracing::error!(error = %other, "Database operation failed");
                ApiError::Internal
            }
        }
    }
}

/// Malformed or mistyped request bodies. Covers bad syntax, unknown enum
/// values, invalid regexes and a missing JSON content type.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<UrlValidationError> for ApiError {
    fn from(err: UrlValidationError) -> Self {
        ApiError::BadRequest(format!("Invalid feed URL: {err}"))
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::UpstreamStatus(status) => {
                ApiError::BadGateway(format!("Feed returned status code {status}"))
            }
            ProxyError::Filter(FilterError::InvalidRule { .. }) => {
                ApiError::BadRequest(err.to_string())
            }
            ProxyError::Filter(FilterError::Parse(e)) => {
                ApiError::BadGateway(format!("Feed is not well-formed XML: {e}"))
            }
            ProxyError::Fetch(FetchError::InvalidUrl(e)) => e.into(),
            ProxyError::Fetch(e) => {
                tracing::error!(error = %e, "Test fetch failed");
                ApiError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::XmlDocument;

    async fn problem(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_upstream_status_is_bad_gateway_problem() {
        let (status, body) = problem(ProxyError::UpstreamStatus(404).into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["status"], 502);
        assert_eq!(body["detail"], "Feed returned status code 404");
    }

    #[tokio::test]
    async fn test_invalid_rule_is_bad_request() {
        let err = ProxyError::Filter(FilterError::InvalidRule {
            index: 3,
            reason: "custom field without a locator".to_string(),
        });
        let (status, _) = problem(err.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_parse_error_is_bad_gateway() {
        let parse = XmlDocument::parse("<rss>").unwrap_err();
        let (status, _) = problem(ProxyError::Filter(FilterError::Parse(parse)).into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_timeout_is_internal_without_details() {
        let (status, body) = problem(ProxyError::Fetch(FetchError::Timeout).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Internal server error");
    }

    #[tokio::test]
    async fn test_database_errors_map_to_status() {
        let (status, _) = problem(DatabaseError::FeedNotFound("x".to_string()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = problem(DatabaseError::DuplicateRuleIndex(1).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = problem(DatabaseError::Corrupt("bad".to_string()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unauthorized_sets_challenge() {
        let response = ApiError::Unauthorized("Missing bearer token").into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
