//! # Admin & Operator Authentication
//!
//! Two shared secrets guard the non-gateway surface:
//!
//! - `ADMIN_TOKEN`, sent as `Authorization: Bearer <token>` to `/admin/*`.
//!   When it is not configured the admin routes answer 503 rather than
//!   opening up.
//! - `WEBHOOK_TEST_SECRET`, sent as `X-Test-Secret` to the test-payload
//!   generator.
//!
//! Both are compared in constant time.

use axum::extract::Request;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// Header carrying the test-payload secret.
pub const TEST_SECRET_HEADER: &str = "x-test-secret";

/// Admin auth configuration injected into request extensions.
#[derive(Clone)]
pub struct AdminAuth {
    pub token: Option<String>,
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Constant-time comparison of shared secrets.
///
/// When lengths differ, a dummy comparison keeps timing independent of
/// where the inputs diverge.
pub fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// The bearer token from the `Authorization` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Whether the request carries the expected `X-Test-Secret`.
pub fn test_secret_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(TEST_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| constant_time_token_eq(provided, expected))
}

/// Middleware guarding `/admin/*`.
pub async fn admin_auth_middleware(request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AdminAuth>()
        .and_then(|auth| auth.token.clone());

    let Some(expected) = expected else {
        tracing::warn!("admin request refused: ADMIN_TOKEN not configured");
        return AppError::ServiceUnavailable("admin interface is not configured".into())
            .into_response();
    };

    match bearer_token(request.headers()) {
        Some(provided) if constant_time_token_eq(provided, &expected) => next.run(request).await,
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "admin authentication failed: invalid bearer token");
            AppError::Unauthorized("invalid bearer token".into()).into_response()
        }
        None => {
            tracing::warn!(path = %request.uri().path(), "admin authentication failed: missing bearer token");
            AppError::Unauthorized("missing bearer token".into()).into_response()
        }
    }
}
