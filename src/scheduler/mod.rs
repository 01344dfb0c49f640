//! Flush scheduling and failure recovery
//!
//! - **Batch Scheduler**: timer and size-threshold triggers, single-flight
//!   delivery, bounded by a per-delivery timeout
//! - **Recovery Controller**: puts failed batches back at the queue head
//!
//! # Architecture
//!
//! ```text
//! log() ─→ PendingQueue ─→ len >= batch_size? ─┐
//!                                              ├─→ flush ─→ Transport
//!          interval (processing_interval) ─────┘      │
//!                                                  failure
//!                                                     ↓
//!                                      RecoveryController::on_failure
//!                                        (requeue_front, no backoff)
//! ```

pub mod batch_scheduler;
pub mod recovery;

// Re-export commonly used types
pub use batch_scheduler::{BatchScheduler, FlushOutcome, FlushTrigger, SchedulerConfig};
pub use recovery::{RecoveryController, RecoveryStats};
