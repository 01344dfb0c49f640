//! Pipeline configuration
//!
//! Values are layered: built-in defaults, then an optional
//! `activity-telemetry.toml` file, then `ACTIVITY_TELEMETRY_*` environment
//! variables (e.g. `ACTIVITY_TELEMETRY_BATCH_SIZE=25`).

use crate::utils::errors::{Result, TelemetryError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default config file name (without extension)
pub const DEFAULT_CONFIG_FILE: &str = "activity-telemetry";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ACTIVITY_TELEMETRY";

/// Telemetry pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Maximum entries per batch; reaching it on enqueue triggers a flush
    pub batch_size: usize,

    /// Periodic flush interval (milliseconds)
    pub processing_interval_ms: u64,

    /// Upper bound on one delivery attempt (milliseconds)
    pub delivery_timeout_ms: u64,

    /// Absolute http URI batches are POSTed to
    pub endpoint: String,

    /// Header carrying the anti-forgery token
    pub csrf_header: String,

    /// Anti-forgery token, if the page provided one
    pub csrf_token: Option<String>,

    /// HTML page whose `csrf-token` meta tag supplies the token when
    /// `csrf_token` is unset
    pub csrf_page: Option<PathBuf>,

    /// Session cookie sent with each delivery
    pub cookie: Option<String>,

    /// Client identification stamped on every entry
    pub user_agent: String,

    /// Key fragments whose values are redacted from entry data
    pub sensitive_fields: Vec<String>,

    /// Prometheus exporter listen address; disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            processing_interval_ms: 5000,
            delivery_timeout_ms: 10_000,
            endpoint: "http://127.0.0.1:8000/activity/log/".to_string(),
            csrf_header: "X-CSRFToken".to_string(),
            csrf_token: None,
            csrf_page: None,
            cookie: None,
            user_agent: format!("activity-telemetry/{}", env!("CARGO_PKG_VERSION")),
            sensitive_fields: ["password", "passwd", "secret", "token", "csrf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            metrics_addr: None,
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from the default file and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from `path` (optional) and the environment
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sensitive_fields"),
            )
            .build()?;

        let config: TelemetryConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TelemetryError::Config("batch_size must be at least 1".to_string()));
        }
        if self.processing_interval_ms == 0 {
            return Err(TelemetryError::Config(
                "processing_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.delivery_timeout_ms == 0 {
            return Err(TelemetryError::Config(
                "delivery_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.endpoint.parse::<hyper::Uri>().is_err() {
            return Err(TelemetryError::Config(format!(
                "endpoint is not a valid URI: {}",
                self.endpoint
            )));
        }
        Ok(())
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}
