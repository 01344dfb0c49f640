//! Activity recording
//!
//! - **Recorder**: builds normalized, redacted log entries
//! - **Event Queue**: unbounded FIFO of entries awaiting delivery
//! - **Logger**: session facade tying recording to the batch scheduler
//!
//! # Architecture
//!
//! ```text
//! capture layer → log() → EventRecordBuilder → PendingQueue → BatchScheduler
//!                           (redact, stamp)       (FIFO)       (timer / size)
//! ```

pub mod event_queue;
pub mod logger;
pub mod recorder;

// Re-export commonly used types
pub use event_queue::{Batch, BatchPayload, PendingQueue, QueueStats};
pub use logger::{ActivityLogger, TelemetryStats};
pub use recorder::{
    ActionType, ElementRef, EventRecordBuilder, Interaction, LogEntry, PageContext, Redactor,
    REDACTION_MARKER,
};
