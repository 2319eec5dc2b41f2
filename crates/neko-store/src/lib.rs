//! Adapter for the external attachment store.
//!
//! This crate is the only place that talks to the Discord REST API and its
//! CDN. Every operation is stateless and retryable at the caller; dropping a
//! returned future cancels the outbound request.

mod discord;
pub mod expiry;

pub use discord::{DiscordStore, MessageSummary, StoredAttachment};

use thiserror::Error;

/// Adapter operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store answered with a non-success status.
    #[error("upstream responded with status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Transport-level failure (connect, TLS, timeout).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered 2xx but the payload was not in the expected shape.
    #[error("unexpected upstream response: {0}")]
    InvalidResponse(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
