//! Error types for the gateway.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Driver failures are kept as a separate [`DriverError`] and attached as the source.

use crate::db::{ConnectionMode, DriverError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed for target '{target}': {message}")]
    Connection {
        target: String,
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("Target '{target}' has no registered {mode} connection")]
    NotConnected {
        target: String,
        mode: ConnectionMode,
    },

    /// The SQL text is kept for logging at the call site but never displayed
    #[error("Query failed on target '{target}': {source}")]
    Query {
        target: String,
        sql: String,
        #[source]
        source: DriverError,
    },

    #[error("Authentication failed for '{login}': {reason}")]
    Authentication { login: String, reason: String },

    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error without a driver cause.
    pub fn connection(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error caused by a driver failure.
    pub fn connection_failed(target: impl Into<String>, source: DriverError) -> Self {
        Self::Connection {
            target: target.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn not_connected(target: impl Into<String>, mode: ConnectionMode) -> Self {
        Self::NotConnected {
            target: target.into(),
            mode,
        }
    }

    pub fn query(target: impl Into<String>, sql: impl Into<String>, source: DriverError) -> Self {
        Self::Query {
            target: target.into(),
            sql: sql.into(),
            source,
        }
    }

    pub fn authentication(login: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            login: login.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The driver failure behind this error, if any.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Connection { source, .. } => source.as_ref(),
            Self::Query { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Query { source, .. } => matches!(
                source,
                DriverError::Timeout { .. } | DriverError::PoolTimedOut
            ),
            _ => false,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Catch-all HTTP mapping. Routes that want a specific status handle the
/// error before it reaches this point.
impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Unhandled request error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": 500,
                "message": "Something went wrong",
            })),
        )
            .into_response()
    }
}
