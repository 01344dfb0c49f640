//! Activity Telemetry Pipeline
//!
//! Buffers user-activity log entries in memory and ships them to a
//! collection endpoint in batches, with at-least-once delivery.
//!
//! # Architecture
//!
//! The library is structured into several modules:
//!
//! - **recording**: entry building, redaction, the pending queue, and the
//!   `ActivityLogger` facade
//! - **scheduler**: timer and size-threshold flushing, single-flight
//!   delivery, requeue-at-head recovery
//! - **delivery**: the `Transport` seam and its HTTP implementation
//! - **observability**: tracing and metrics setup
//! - **utils**: configuration and error types
//!
//! # Example
//!
//! ```no_run
//! use activity_telemetry::{ActionType, ActivityLogger, TelemetryConfig};
//!
//! # async fn run() -> activity_telemetry::Result<()> {
//! let config = TelemetryConfig::load()?;
//! let logger = ActivityLogger::with_http(&config)?;
//! logger.start()?;
//!
//! logger.set_page("/dashboard/");
//! logger.log(ActionType::Click, &serde_json::json!({"x": 12, "y": 40}), None)?;
//!
//! logger.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Public module exports
pub mod delivery;
pub mod observability;
pub mod recording;
pub mod scheduler;
pub mod utils;

// Re-export commonly used types
pub use delivery::{DeliveryReceipt, HttpDeliveryClient, Transport};
pub use recording::{ActionType, ActivityLogger, ElementRef, Interaction, LogEntry};
pub use scheduler::{BatchScheduler, FlushOutcome};
pub use utils::config::TelemetryConfig;
pub use utils::errors::{Result, TelemetryError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Build metadata stamped in by `build.rs`, reported at agent startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    /// Seconds since the Unix epoch
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }

    /// Build time, when the stamp parses
    pub fn built_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let secs = self.build_timestamp.parse::<i64>().ok()?;
        chrono::DateTime::from_timestamp(secs, 0)
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({}, {})", self.version, self.git_hash, self.rustc_version)
    }
}
