//! Shared-secret authentication middleware.
//!
//! The whole API is guarded by one pre-shared secret, accepted as a bearer
//! token, a bare `Authorization` value, or a `?token=` query parameter.
//! When no secret is configured the middleware is a pass-through.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use neko_core::AppError;
use subtle::ConstantTimeEq;

use crate::error::HttpAppError;

#[derive(Clone)]
pub struct AuthState {
    pub secret: Option<String>,
}

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Pull the presented secret out of the request, header first.
fn presented_secret(request: &Request) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        let value = header.strip_prefix("Bearer ").unwrap_or(header);
        return Some(value.to_string());
    }

    request.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix("token=")
                .map(|v| urlencoding::decode(v).map(|s| s.into_owned()).unwrap_or_default())
        })
    })
}

pub async fn auth_middleware(
    State(auth): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ref secret) = auth.secret else {
        return next.run(request).await;
    };

    match presented_secret(&request) {
        Some(presented) if secure_compare(&presented, secret) => next.run(request).await,
        Some(_) => {
            HttpAppError(AppError::Unauthorized("Invalid token".to_string())).into_response()
        }
        None => HttpAppError(AppError::Unauthorized("Missing token".to_string())).into_response(),
    }
}
