//! Retry/recovery controller
//!
//! A failed batch goes back to the head of the pending queue, ahead of
//! anything enqueued while it was in flight. There is no backoff and no
//! retry limit: the next scheduler trigger simply tries again.

use crate::delivery::DeliveryReceipt;
use crate::observability::metrics::{
    BATCHES_DELIVERED, BATCHES_FAILED, ENTRIES_DELIVERED, ENTRIES_REQUEUED,
};
use crate::recording::event_queue::{Batch, PendingQueue};
use crate::utils::errors::TelemetryError;
use metrics::counter;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Handles the outcome of each delivery attempt
pub struct RecoveryController {
    queue: Arc<PendingQueue>,
    stats: Mutex<RecoveryStats>,
}

impl RecoveryController {
    pub fn new(queue: Arc<PendingQueue>) -> Self {
        Self {
            queue,
            stats: Mutex::new(RecoveryStats::default()),
        }
    }

    /// Batch accepted: its entries are done with
    pub fn on_success(&self, batch: &Batch, receipt: &DeliveryReceipt) {
        let delivered = batch.len() as u64;

        if let Some(logged) = receipt.logged_entries {
            if logged != delivered {
                debug!("Endpoint logged {} of {} delivered entries", logged, delivered);
            }
        }

        counter!(BATCHES_DELIVERED).increment(1);
        counter!(ENTRIES_DELIVERED).increment(delivered);

        let mut stats = self.stats.lock();
        stats.batches_delivered += 1;
        stats.entries_delivered += delivered;
        stats.consecutive_failures = 0;
    }

    /// Batch failed: put it back at the head of the queue
    pub fn on_failure(&self, batch: Batch, error: &TelemetryError) {
        let entries = batch.len() as u64;
        self.queue.requeue_front(batch.into_entries());

        counter!(BATCHES_FAILED).increment(1);
        counter!(ENTRIES_REQUEUED).increment(entries);

        let consecutive = {
            let mut stats = self.stats.lock();
            stats.batches_failed += 1;
            stats.entries_requeued += entries;
            stats.consecutive_failures += 1;
            if !error.is_delivery_failure() {
                stats.unexpected_errors += 1;
            }
            stats.last_error = Some(error.to_string());
            stats.consecutive_failures
        };

        if !error.is_delivery_failure() {
            error!(entries, "Transport returned a non-delivery error, batch requeued: {}", error);
            return;
        }

        warn!(
            entries,
            consecutive_failures = consecutive,
            "Delivery failed, batch requeued: {}",
            error
        );
    }

    pub fn stats(&self) -> RecoveryStats {
        self.stats.lock().clone()
    }
}

/// Delivery outcome statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub batches_delivered: u64,
    pub entries_delivered: u64,
    pub batches_failed: u64,
    pub entries_requeued: u64,
    /// Failures since the last successful delivery
    pub consecutive_failures: u64,
    /// Failures whose error was not a network, status or timeout failure
    pub unexpected_errors: u64,
    pub last_error: Option<String>,
}
