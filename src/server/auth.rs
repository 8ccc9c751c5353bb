use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::error::ApiError;
use super::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Admin API access settings.
#[derive(Clone)]
pub struct AdminAuth {
    enabled: bool,
    token: Option<SecretString>,
}

impl AdminAuth {
    pub fn new(enabled: bool, token: Option<SecretString>) -> Self {
        Self { enabled, token }
    }

    /// Checks an `Authorization` header value.
    ///
    /// Malformed credentials are rejected before the enabled check, so
    /// unauthenticated callers always see 401.
    pub fn check(&self, authorization: Option<&str>) -> Result<(), ApiError> {
        let authorization =
            authorization.ok_or(ApiError::Unauthorized("Missing Authorization header"))?;
        let presented = authorization
            .strip_prefix(BEARER_PREFIX)
            .ok_or(ApiError::Unauthorized("Authorization scheme must be Bearer"))?;

        let expected = match (&self.token, self.enabled) {
            (Some(token), true) if !token.expose_secret().is_empty() => token,
            _ => return Err(ApiError::Forbidden("Admin API is disabled")),
        };

        // SEC-004: Constant-time comparison so the token cannot be guessed byte by byte
        if bool::from(presented.as_bytes().ct_eq(expected.expose_secret().as_bytes())) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized("Invalid token"))
        }
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("enabled", &self.enabled)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Middleware guarding the `/api` routes.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match state.auth.check(authorization) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::info!(
                path = %request.uri().path(),
                error = %e,
                "Rejected admin request"
            );
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(enabled: bool, token: Option<&str>) -> AdminAuth {
        AdminAuth::new(enabled, token.map(|t| SecretString::from(t.to_string())))
    }

    #[test]
    fn test_valid_token_accepted() {
        assert!(auth(true, Some("s3cret")).check(Some("Bearer s3cret")).is_ok());
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        assert!(matches!(
            auth(true, Some("s3cret")).check(None),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_wrong_scheme_is_unauthorized() {
        assert!(matches!(
            auth(true, Some("s3cret")).check(Some("Basic czNjcmV0")),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_wrong_token_is_unauthorized() {
        for presented in ["Bearer nope", "Bearer s3cre", "Bearer s3cret2", "Bearer "] {
            assert!(matches!(
                auth(true, Some("s3cret")).check(Some(presented)),
                Err(ApiError::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn test_disabled_or_unset_token_is_forbidden() {
        for guard in [
            auth(false, Some("s3cret")),
            auth(true, None),
            auth(true, Some("")),
        ] {
            assert!(matches!(
                guard.check(Some("Bearer s3cret")),
                Err(ApiError::Forbidden(_))
            ));
        }
    }

    #[test]
    fn test_debug_masks_token() {
        let debug = format!("{:?}", auth(true, Some("s3cret")));
        assert!(!debug.contains("s3cret"));
    }
}
