//! Error types module
//!
//! All errors are unified under the `AppError` enum which carries the HTTP
//! status and machine-readable code each variant maps to. The HTTP layer
//! wraps it for response conversion; everything below it returns plain
//! `Result<_, AppError>`.

use std::io;

use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors like validation failures
    Debug,
    /// Recoverable issues, e.g. upstream hiccups
    Warn,
    /// Unexpected failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl AppError {
    /// HTTP status code this error maps to.
    pub fn http_status_code(&self) -> u16 {
        match self {
            AppError::Database(_) | AppError::Internal(_) => 500,
            AppError::InvalidInput(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::RangeNotSatisfiable(_) => 416,
            AppError::Upstream { .. } => 502,
        }
    }

    /// Machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::RangeNotSatisfiable(_) => "RANGE_NOT_SATISFIABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Upstream { .. } => "UPSTREAM_ERROR",
        }
    }

    /// Stable client-facing message. Internal diagnostics stay in logs.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Upstream { status, .. } => {
                format!("Upstream storage request failed with status {}", status)
            }
            AppError::InvalidInput(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::RangeNotSatisfiable(msg) => msg.clone(),
        }
    }

    /// Whether the full internal message may be shown in `details`.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Internal(_)
        )
    }

    pub fn log_level(&self) -> LogLevel {
        match self {
            AppError::Database(_) | AppError::Internal(_) => LogLevel::Error,
            AppError::Upstream { .. } => LogLevel::Warn,
            _ => LogLevel::Debug,
        }
    }
}
