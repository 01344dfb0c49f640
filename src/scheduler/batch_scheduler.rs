//! Batch scheduler
//!
//! Two triggers request a flush: a periodic timer and the queue reaching
//! `batch_size` on enqueue. At most one delivery is in flight; a trigger that
//! arrives while one is outstanding is dropped, not remembered.
//!
//! # Flush lifecycle
//!
//! ```text
//! trigger ─→ acquire in-flight flag ──(held)──→ Skipped
//!                   │
//!             take batch ──(empty)──→ Empty
//!                   │
//!             deliver (bounded by timeout)
//!                   │
//!         ┌─────────┴──────────┐
//!      success              failure / timeout / cancelled
//!    (batch dropped)      (batch requeued at head)
//!         └─────────┬──────────┘
//!             release flag
//! ```

use crate::delivery::{DeliveryReceipt, Transport};
use crate::observability::metrics::{FLUSHES_SKIPPED, PENDING_ENTRIES};
use crate::recording::event_queue::{Batch, PendingQueue};
use crate::scheduler::recovery::{RecoveryController, RecoveryStats};
use crate::utils::config::TelemetryConfig;
use crate::utils::errors::{Result, TelemetryError};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum entries per batch, also the enqueue threshold
    pub batch_size: usize,

    /// Periodic flush interval
    pub processing_interval: Duration,

    /// Upper bound on a single delivery attempt
    pub delivery_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_telemetry_config(&TelemetryConfig::default())
    }
}

impl SchedulerConfig {
    pub fn from_telemetry_config(config: &TelemetryConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            processing_interval: config.processing_interval(),
            delivery_timeout: config.delivery_timeout(),
        }
    }
}

/// What caused a flush request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Threshold,
    Timer,
    Manual,
    Shutdown,
}

/// Result of one flush request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue was empty; no transport call made
    Empty,

    /// A delivery was already in flight
    Skipped,

    /// Batch accepted by the endpoint
    Delivered {
        entries: usize,
        receipt: DeliveryReceipt,
    },

    /// Delivery failed; batch is back at the queue head
    Requeued { entries: usize },
}

struct SchedulerShared {
    queue: Arc<PendingQueue>,
    transport: Arc<dyn Transport>,
    recovery: RecoveryController,
    in_flight: AtomicBool,
    flight_done: Notify,
    batch_size: usize,
    delivery_timeout: Duration,
}

impl SchedulerShared {
    /// Start a flush now and finish the delivery on `runtime`
    fn spawn_flush(self: &Arc<Self>, runtime: &Handle, trigger: FlushTrigger) {
        match InFlight::begin(self) {
            Ok(flight) => {
                runtime.spawn(flight.deliver(trigger));
            }
            Err(FlushOutcome::Skipped) => {
                counter!(FLUSHES_SKIPPED).increment(1);
                debug!(?trigger, "Delivery already in flight, flush skipped");
            }
            Err(_) => {}
        }
    }
}

/// The one outstanding delivery.
///
/// Holds the in-flight flag for its lifetime. If dropped before the
/// delivery settles, the batch goes back to the queue head.
struct InFlight {
    shared: Arc<SchedulerShared>,
    batch: Batch,
    settled: bool,
}

impl InFlight {
    /// Acquire the flag and take a batch, synchronously
    fn begin(shared: &Arc<SchedulerShared>) -> std::result::Result<Self, FlushOutcome> {
        if shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FlushOutcome::Skipped);
        }

        let flight = Self {
            shared: Arc::clone(shared),
            batch: shared.queue.take_batch(shared.batch_size),
            settled: false,
        };
        if flight.batch.is_empty() {
            return Err(FlushOutcome::Empty);
        }
        Ok(flight)
    }

    async fn deliver(mut self, trigger: FlushTrigger) -> FlushOutcome {
        let shared = Arc::clone(&self.shared);
        let entries = self.batch.len();
        debug!(?trigger, entries, "Flushing batch");

        let result = match tokio::time::timeout(
            shared.delivery_timeout,
            shared.transport.deliver(&self.batch),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TelemetryError::Timeout(shared.delivery_timeout)),
        };

        self.settled = true;
        let batch = std::mem::take(&mut self.batch);

        let outcome = match result {
            Ok(receipt) => {
                shared.recovery.on_success(&batch, &receipt);
                FlushOutcome::Delivered { entries, receipt }
            }
            Err(error) => {
                shared.recovery.on_failure(batch, &error);
                FlushOutcome::Requeued { entries }
            }
        };

        gauge!(PENDING_ENTRIES).set(shared.queue.len() as f64);
        outcome
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled && !self.batch.is_empty() {
            warn!(
                entries = self.batch.len(),
                "Delivery cancelled before completing, batch requeued"
            );
            let batch = std::mem::take(&mut self.batch);
            self.shared.queue.requeue_front(batch.into_entries());
        }
        self.shared.in_flight.store(false, Ordering::Release);
        self.shared.flight_done.notify_waiters();
    }
}

/// Drives flushes of the pending queue
pub struct BatchScheduler {
    shared: Arc<SchedulerShared>,
    processing_interval: Duration,
    runtime: Mutex<Option<Handle>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BatchScheduler {
    pub fn new(
        config: SchedulerConfig,
        queue: Arc<PendingQueue>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let shared = Arc::new(SchedulerShared {
            recovery: RecoveryController::new(Arc::clone(&queue)),
            queue,
            transport,
            in_flight: AtomicBool::new(false),
            flight_done: Notify::new(),
            batch_size: config.batch_size.max(1),
            delivery_timeout: config.delivery_timeout,
        });

        Self {
            shared,
            processing_interval: config.processing_interval,
            runtime: Mutex::new(None),
            timer_handle: Mutex::new(None),
        }
    }

    /// Start the periodic timer on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| {
            TelemetryError::Runtime(format!("Scheduler must start inside a tokio runtime: {}", e))
        })?;

        let mut timer_handle = self.timer_handle.lock();
        if timer_handle.is_some() {
            warn!("Batch scheduler already started");
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let period = self.processing_interval;
        // Anchored to this call, not to the task's first poll
        let first_tick = Instant::now() + period;
        let timer_runtime = runtime.clone();
        let handle = runtime.spawn(async move {
            let mut interval = interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                shared.spawn_flush(&timer_runtime, FlushTrigger::Timer);
            }
        });

        *timer_handle = Some(handle);
        *self.runtime.lock() = Some(runtime);

        info!(
            "Batch scheduler started (batch size {}, interval {:?})",
            self.shared.batch_size, self.processing_interval
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Threshold trigger; call after every enqueue with the new length
    pub fn notify_enqueued(&self, queue_len: usize) {
        if queue_len < self.shared.batch_size {
            return;
        }
        let runtime = self.runtime.lock().clone();
        match runtime {
            Some(runtime) => self.shared.spawn_flush(&runtime, FlushTrigger::Threshold),
            None => debug!("Batch threshold reached before scheduler start"),
        }
    }

    /// Flush now and wait for the outcome
    pub async fn flush(&self) -> FlushOutcome {
        self.flush_with(FlushTrigger::Manual).await
    }

    async fn flush_with(&self, trigger: FlushTrigger) -> FlushOutcome {
        match InFlight::begin(&self.shared) {
            Ok(flight) => flight.deliver(trigger).await,
            Err(outcome) => {
                if outcome == FlushOutcome::Skipped {
                    counter!(FLUSHES_SKIPPED).increment(1);
                }
                outcome
            }
        }
    }

    pub fn in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn batch_size(&self) -> usize {
        self.shared.batch_size
    }

    pub fn recovery_stats(&self) -> RecoveryStats {
        self.shared.recovery.stats()
    }

    /// Stop the timer, then flush until the queue is empty or a delivery
    /// does not succeed. Returns the number of entries left undelivered.
    pub async fn shutdown(&self) -> usize {
        info!("Shutting down batch scheduler");

        if let Some(handle) = self.timer_handle.lock().take() {
            handle.abort();
        }
        self.runtime.lock().take();

        let mut waited_for_flight = false;
        loop {
            match self.flush_with(FlushTrigger::Shutdown).await {
                FlushOutcome::Delivered { .. } => continue,
                FlushOutcome::Skipped if !waited_for_flight => {
                    waited_for_flight = true;
                    self.wait_for_flight().await;
                }
                _ => break,
            }
        }

        let remaining = self.shared.queue.len();
        if remaining > 0 {
            warn!("{} entries left undelivered at shutdown", remaining);
        }
        remaining
    }

    /// Wait (up to one delivery timeout) for the outstanding delivery
    async fn wait_for_flight(&self) {
        let released = self.shared.flight_done.notified();
        tokio::pin!(released);
        // Register before checking the flag so a release in between is seen
        released.as_mut().enable();
        if !self.in_flight() {
            return;
        }
        if tokio::time::timeout(self.shared.delivery_timeout, released)
            .await
            .is_err()
        {
            warn!("Outstanding delivery did not finish before shutdown");
        }
    }
}

impl Drop for BatchScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer_handle.get_mut().take() {
            handle.abort();
        }
    }
}
