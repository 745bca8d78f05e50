//! Bearer token authentication for the task API.
//!
//! When `TODOLIST_API_TOKEN` is set every endpoint except `/health` requires
//! an `Authorization: Bearer <token>` header. Tokens are compared in
//! constant time.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Errors that can occur while authenticating a request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token was supplied.
    #[error("missing bearer token")]
    MissingToken,

    /// The supplied token does not match the configured one.
    #[error("invalid token")]
    InvalidToken,
}

/// Compares a provided token with the expected one in constant time.
///
/// # Errors
///
/// Returns [`AuthError::InvalidToken`] on mismatch.
pub fn validate_token(provided: &str, expected: &str) -> Result<(), AuthError> {
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}

/// Extracts the bearer token from an `Authorization` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Checks a request against the configured token. `None` disables auth.
///
/// # Errors
///
/// Returns [`AuthError::MissingToken`] when no bearer token was sent and
/// [`AuthError::InvalidToken`] when it does not match.
pub fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AuthError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = bearer_token(headers).ok_or(AuthError::MissingToken)?;
    validate_token(provided, expected)
}
