//! Logging and metrics setup
//!
//! - **Tracing**: `RUST_LOG` filter (default `info`), `LOG_FORMAT=json` for
//!   structured output
//! - **Metrics**: Prometheus exporter, only when a listen address is set

pub mod metrics;

use crate::utils::errors::{Result, TelemetryError};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| TelemetryError::Config(format!("Failed to init tracing: {}", e)))
}

/// Install the Prometheus exporter when `addr` is set
pub fn init_metrics(addr: Option<SocketAddr>) -> Result<()> {
    let Some(addr) = addr else {
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::Config(format!("Failed to init metrics exporter: {}", e)))?;

    metrics::describe_metrics();
    info!("Prometheus metrics exporter listening on {}", addr);
    Ok(())
}
