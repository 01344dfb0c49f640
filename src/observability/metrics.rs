//! Metric names and descriptions

use metrics::{describe_counter, describe_gauge, Unit};

pub const ENTRIES_RECORDED: &str = "activity_telemetry_entries_recorded_total";
pub const ENTRIES_REJECTED: &str = "activity_telemetry_entries_rejected_total";
pub const BATCHES_DELIVERED: &str = "activity_telemetry_batches_delivered_total";
pub const ENTRIES_DELIVERED: &str = "activity_telemetry_entries_delivered_total";
pub const BATCHES_FAILED: &str = "activity_telemetry_batches_failed_total";
pub const ENTRIES_REQUEUED: &str = "activity_telemetry_entries_requeued_total";
pub const FLUSHES_SKIPPED: &str = "activity_telemetry_flushes_skipped_total";
pub const PENDING_ENTRIES: &str = "activity_telemetry_pending_entries";

/// Register descriptions with the installed recorder
pub fn describe_metrics() {
    describe_counter!(ENTRIES_RECORDED, Unit::Count, "Log entries built and enqueued");
    describe_counter!(
        ENTRIES_REJECTED,
        Unit::Count,
        "Interactions whose payload could not be turned into an entry"
    );
    describe_counter!(BATCHES_DELIVERED, Unit::Count, "Batches accepted by the endpoint");
    describe_counter!(ENTRIES_DELIVERED, Unit::Count, "Entries in accepted batches");
    describe_counter!(BATCHES_FAILED, Unit::Count, "Delivery attempts that failed");
    describe_counter!(ENTRIES_REQUEUED, Unit::Count, "Entries put back at the queue head");
    describe_counter!(
        FLUSHES_SKIPPED,
        Unit::Count,
        "Flush requests ignored because a delivery was in flight"
    );
    describe_gauge!(PENDING_ENTRIES, Unit::Count, "Entries waiting in the pending queue");
}
