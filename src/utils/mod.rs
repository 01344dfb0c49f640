//! Shared utilities: configuration and error types

pub mod config;
pub mod errors;

pub use self::config::TelemetryConfig;
pub use errors::{Result, TelemetryError};
