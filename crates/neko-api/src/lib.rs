//! HTTP API for the neko object store.
//!
//! Exposed as a library so integration tests can assemble the router against
//! a scratch database and a mock upstream.

pub mod api_doc;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod services;
pub mod setup;
pub mod state;
