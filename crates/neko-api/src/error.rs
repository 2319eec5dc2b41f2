//! HTTP error response conversion
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`; `AppError`
//! values convert into `HttpAppError` and render as the uniform
//! `{success:false, error, details?}` body with the right status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use neko_core::{AppError, LogLevel};
use neko_store::StoreError;
use serde::Serialize;
use utoipa::ToSchema;

/// Success envelope: `{success: true, data: ...}`.
#[derive(Debug, Serialize)]
pub struct ApiSuccess<T: Serialize> {
    pub success: bool,
    pub data: T,
}

/// Shorthand used by every handler for its happy path.
pub fn ok<T: Serialize>(data: T) -> Json<ApiSuccess<T>> {
    Json(ApiSuccess {
        success: true,
        data,
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Wrapper type for AppError to implement IntoResponse; the orphan rule
/// keeps us from implementing it on the core type directly.
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<sqlx::Error> for HttpAppError {
    fn from(err: sqlx::Error) -> Self {
        HttpAppError(AppError::Database(err))
    }
}

impl From<StoreError> for HttpAppError {
    fn from(err: StoreError) -> Self {
        HttpAppError(upstream_error(err))
    }
}

/// Adapter failures surface uniformly as `Upstream`; transport errors carry
/// no upstream status and report as a bad gateway.
pub fn upstream_error(err: StoreError) -> AppError {
    match err {
        StoreError::Upstream { status, body } => AppError::Upstream {
            status,
            message: body,
        },
        StoreError::Http(e) => AppError::Upstream {
            status: 502,
            message: e.to_string(),
        },
        StoreError::InvalidResponse(msg) => AppError::Upstream {
            status: 502,
            message: msg,
        },
    }
}

fn log_error(error: &AppError) {
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(error = %error, code = error.error_code(), "request failed"),
        LogLevel::Warn => tracing::warn!(error = %error, code = error.error_code(), "request failed"),
        LogLevel::Error => tracing::error!(error = %error, code = error.error_code(), "request failed"),
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let err = &self.0;
        log_error(err);

        let status = StatusCode::from_u16(err.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Sensitive diagnostics stay in logs.
        let details = if err.is_sensitive() {
            None
        } else {
            let full = err.to_string();
            (full != err.client_message()).then_some(full)
        };

        let body = Json(ErrorResponse {
            success: false,
            error: err.client_message(),
            details,
        });

        (status, body).into_response()
    }
}
