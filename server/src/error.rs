//! Error types for the todolist server.
//!
//! - [`StoreError`]: failures of the GitHub-backed task store
//! - [`ApiError`]: errors returned to HTTP clients, rendered as
//!   `{"error": ..., "code": ...}` JSON
//!
//! Configuration errors live in [`crate::config::ConfigError`] and GitHub
//! transport errors in [`crate::github::GitHubError`].

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::github::GitHubError;
use crate::tasks::TaskError;

/// Errors raised by the task store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The repository call failed.
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// A task could not be decoded, encoded or validated.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// A stored file exists but is not a valid task.
    #[error("invalid task file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: TaskError,
    },
}

/// An error returned to an HTTP client.
#[derive(Debug)]
pub enum ApiError {
    /// The request is malformed or fails validation (400).
    BadRequest { message: String, code: &'static str },

    /// Missing or wrong bearer token (401).
    Unauthorized(AuthError),

    /// The task does not exist (404).
    NotFound(String),

    /// Stale sha or the file already exists (409).
    Conflict(String),

    /// GitHub failed or is unreachable (502).
    Upstream(String),

    /// Anything else (500).
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "bad request: {message}"),
            Self::Unauthorized(err) => write!(f, "unauthorized: {err}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Conflict(what) => write!(f, "conflict: {what}"),
            Self::Upstream(msg) => write!(f, "upstream error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Creates a validation error with the generic `invalid_request` code.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            code: "invalid_request",
        }
    }

    /// Creates a validation error with a specific code.
    pub fn bad_request_with_code(message: impl Into<String>, code: &'static str) -> Self {
        Self::BadRequest {
            message: message.into(),
            code,
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code sent alongside the message.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. } => code,
            Self::Unauthorized(AuthError::MissingToken) => "missing_token",
            Self::Unauthorized(AuthError::InvalidToken) => "invalid_token",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "server_error",
        }
    }

    /// Returns `true` if the client caused this error.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest { message, .. } => message.clone(),
            Self::Unauthorized(err) => err.to_string(),
            Self::NotFound(what) => format!("not found: {what}"),
            Self::Conflict(what) => format!("conflict: {what}"),
            Self::Upstream(msg) => msg.clone(),
            // Internal details stay in the log.
            Self::Internal(_) => "internal server error".to_string(),
        }
    }
}

/// JSON body of an error response.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.message(),
            code: Some(self.code()),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Unauthorized(err)
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self::bad_request_with_code(err.to_string(), "invalid_task")
    }
}

impl From<GitHubError> for ApiError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::NotFound(path) => Self::NotFound(path),
            GitHubError::Conflict(what) => Self::Conflict(what),
            GitHubError::NotAFile(path) => {
                Self::bad_request_with_code(format!("path is not a file: {path}"), "not_a_file")
            }
            GitHubError::Configuration(msg) => Self::Internal(msg),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::GitHub(err) => err.into(),
            StoreError::Task(err) => err.into(),
            corrupt @ StoreError::Corrupt { .. } => Self::Upstream(corrupt.to_string()),
        }
    }
}
