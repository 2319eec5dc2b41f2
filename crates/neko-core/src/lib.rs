//! Core types shared by every neko crate: configuration, errors, domain
//! models and tuning constants.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{AppError, LogLevel};
