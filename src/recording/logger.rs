//! Activity logger
//!
//! Session-scoped entry point: builds entries, queues them, and owns the
//! scheduler that ships them. Recording never blocks on delivery and
//! delivery failures never reach the caller of [`ActivityLogger::log`].

use crate::delivery::{DeliveryConfig, HttpDeliveryClient, StaticToken, TokenSource, Transport};
use crate::observability::metrics::{ENTRIES_RECORDED, ENTRIES_REJECTED, PENDING_ENTRIES};
use crate::recording::event_queue::{PendingQueue, QueueStats};
use crate::recording::recorder::{
    ActionType, ElementRef, EventRecordBuilder, Interaction, LogEntry, PageContext, Redactor,
};
use crate::scheduler::{BatchScheduler, FlushOutcome, RecoveryStats, SchedulerConfig};
use crate::utils::config::TelemetryConfig;
use crate::utils::errors::Result;
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Page assumed until the first navigation
pub const INITIAL_PAGE: &str = "/";

/// Batched, retrying activity logger
pub struct ActivityLogger {
    builder: EventRecordBuilder,
    queue: Arc<PendingQueue>,
    scheduler: BatchScheduler,
}

impl ActivityLogger {
    /// Create a logger delivering through `transport`
    pub fn new(config: &TelemetryConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let builder = EventRecordBuilder::new(
            PageContext::new(INITIAL_PAGE, config.user_agent.clone()),
            Redactor::new(&config.sensitive_fields),
        );
        let queue = Arc::new(PendingQueue::new());
        let scheduler = BatchScheduler::new(
            SchedulerConfig::from_telemetry_config(config),
            Arc::clone(&queue),
            transport,
        );

        Ok(Self {
            builder,
            queue,
            scheduler,
        })
    }

    /// Create a logger delivering over HTTP to `config.endpoint`
    pub fn with_http(config: &TelemetryConfig) -> Result<Self> {
        let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::from_config(config)?);
        let client = HttpDeliveryClient::new(DeliveryConfig::from_telemetry_config(config), tokens)?;
        info!("Delivering activity batches to {}", client.endpoint());
        Self::new(config, Arc::new(client))
    }

    /// Start periodic flushing; must run inside a tokio runtime
    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    /// Record one interaction. Fails only if `data` cannot become an
    /// entry, in which case nothing is queued.
    pub fn log<T: Serialize + ?Sized>(
        &self,
        action_type: ActionType,
        data: &T,
        element: Option<ElementRef>,
    ) -> Result<()> {
        let entry = match self.builder.record(action_type, data, element) {
            Ok(entry) => entry,
            Err(e) => {
                counter!(ENTRIES_REJECTED).increment(1);
                return Err(e);
            }
        };

        debug!(action = %entry.action_type, page = %entry.page, "Recorded activity");
        let len = self.queue.enqueue(entry);

        counter!(ENTRIES_RECORDED).increment(1);
        gauge!(PENDING_ENTRIES).set(len as f64);

        self.scheduler.notify_enqueued(len);
        Ok(())
    }

    /// Record an interaction from the capture layer, switching page first
    /// when it carries one
    pub fn log_interaction(&self, interaction: &Interaction) -> Result<()> {
        if let Some(page) = &interaction.page {
            self.set_page(page.clone());
        }
        self.log(
            interaction.action_type.clone(),
            &interaction.data,
            interaction.element(),
        )
    }

    pub fn set_page(&self, page: impl Into<String>) {
        self.builder.set_page(page);
    }

    pub fn page_context(&self) -> PageContext {
        self.builder.context()
    }

    /// Flush now, ignoring the timer
    pub async fn flush(&self) -> FlushOutcome {
        self.scheduler.flush().await
    }

    /// Entries waiting for delivery, head first
    pub fn pending(&self) -> Vec<LogEntry> {
        self.queue.snapshot()
    }

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            queue: self.queue.stats(),
            recovery: self.scheduler.recovery_stats(),
            in_flight: self.scheduler.in_flight(),
        }
    }

    /// Stop the timer and make final delivery attempts. Returns how many
    /// entries are discarded with the logger.
    pub async fn shutdown(&self) -> usize {
        let remaining = self.scheduler.shutdown().await;
        if remaining > 0 {
            warn!("Discarding {} undelivered activity entries", remaining);
        }
        info!(
            "Activity logger stopped: {} of {} recorded entries settled",
            self.queue.stats().settled_count(),
            self.queue.stats().enqueue_count
        );
        remaining
    }
}

/// Combined pipeline statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryStats {
    pub queue: QueueStats,
    pub recovery: RecoveryStats,
    pub in_flight: bool,
}
