//! Activity Telemetry Agent
//!
//! Reads interactions as JSON lines on stdin and ships them to the
//! configured endpoint in batches. One line per interaction:
//!
//! ```text
//! {"action_type": "click", "page": "/home/", "element_id": "save", "data": {"x": 3}}
//! ```

use activity_telemetry::observability::{init_metrics, init_tracing};
use activity_telemetry::{ActivityLogger, BuildInfo, Interaction, TelemetryConfig};
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize observability
    init_tracing()?;

    let build = BuildInfo::current();
    info!("Starting activity telemetry agent {}", build);

    // Load configuration
    let config = TelemetryConfig::load()?;
    info!("Configuration loaded: {:?}", config);
    init_metrics(config.metrics_addr)?;

    let logger = ActivityLogger::with_http(&config)?;
    logger.start()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => match serde_json::from_str::<Interaction>(&line) {
                        Ok(interaction) => {
                            if let Err(e) = logger.log_interaction(&interaction) {
                                warn!("Dropping interaction: {}", e);
                            }
                        }
                        Err(e) => warn!("Ignoring malformed interaction line: {}", e),
                    },
                    None => {
                        info!("Input closed, flushing remaining activity");
                        break;
                    }
                }
            }
            _ = &mut shutdown_signal => {
                info!("Received shutdown signal, flushing remaining activity");
                break;
            }
        }
    }

    let remaining = logger.shutdown().await;
    let stats = logger.stats();
    info!(
        "Stopped: {} recorded, {} delivered, {} settled, {} undelivered",
        stats.queue.enqueue_count,
        stats.recovery.entries_delivered,
        stats.queue.settled_count(),
        remaining
    );
    Ok(())
}
