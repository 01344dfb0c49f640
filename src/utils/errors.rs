//! Error types for the telemetry pipeline

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors produced by the telemetry pipeline
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Entry payload or batch body failed to serialize
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entry payload serialized to something other than a JSON object
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Delivery endpoint is not a usable absolute http URI
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Configured header name is not a valid HTTP header
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Network-level delivery failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Endpoint answered with a non-2xx status
    #[error("delivery rejected with status {status}")]
    Rejected { status: u16 },

    /// Delivery did not complete within the configured timeout
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// Scheduler started outside a tokio runtime
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl TelemetryError {
    /// Whether this error came from a delivery attempt (and so leads to a requeue)
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            TelemetryError::Transport(_)
                | TelemetryError::Rejected { .. }
                | TelemetryError::Timeout(_)
        )
    }
}

impl From<config::ConfigError> for TelemetryError {
    fn from(err: config::ConfigError) -> Self {
        TelemetryError::Config(err.to_string())
    }
}
