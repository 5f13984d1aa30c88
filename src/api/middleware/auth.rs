//! Bearer token authentication
//!
//! When the API is configured with a token, every request must carry
//! `Authorization: Bearer <token>`. Accepted requests get a
//! [`CallerIdentity`] extension that handlers may record, e.g. as the
//! `triggeredBy` field of a manual alert trigger.

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

/// Subject recorded for callers holding the shared API token
pub const TOKEN_SUBJECT: &str = "api-token";

/// Authenticated caller, attached as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    subject: String,
}

impl CallerIdentity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidFormat => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::FORBIDDEN,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing Authorization header",
            AuthError::InvalidFormat => "expected Authorization: Bearer <token>",
            AuthError::InvalidToken => "invalid token",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

/// Identity of the caller presenting `authorization`, checked against `expected`
pub fn authenticate(
    authorization: Option<&str>,
    expected: &str,
) -> Result<CallerIdentity, AuthError> {
    let token = authorization
        .ok_or(AuthError::MissingToken)?
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?;

    if token.trim() != expected {
        return Err(AuthError::InvalidToken);
    }
    Ok(CallerIdentity::new(TOKEN_SUBJECT))
}

pub async fn auth_middleware(
    State(expected_token): State<String>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let caller = authenticate(authorization, &expected_token).inspect_err(|e| {
        debug!("rejected {} {}: {}", request.method(), request.uri().path(), e.message());
    })?;

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
