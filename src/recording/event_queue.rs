//! Pending queue of log entries awaiting delivery
//!
//! Unbounded FIFO. Entries leave it only by being taken into a batch; a
//! failed batch is put back at the head with [`PendingQueue::requeue_front`].

use crate::recording::recorder::LogEntry;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ordered slice of entries taken for one delivery attempt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    entries: Vec<LogEntry>,
}

impl Batch {
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wire body: `{"logs": [...]}`
    pub fn payload(&self) -> BatchPayload<'_> {
        BatchPayload {
            logs: &self.entries,
        }
    }
}

/// Serialized form of a batch
#[derive(Debug, Serialize)]
pub struct BatchPayload<'a> {
    pub logs: &'a [LogEntry],
}

/// In-memory FIFO of entries awaiting delivery
pub struct PendingQueue {
    entries: Mutex<VecDeque<LogEntry>>,

    /// Entries appended by `enqueue`
    enqueue_count: AtomicU64,

    /// Entries removed by `take_batch`
    taken_count: AtomicU64,

    /// Entries put back by `requeue_front`
    requeue_count: AtomicU64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            enqueue_count: AtomicU64::new(0),
            taken_count: AtomicU64::new(0),
            requeue_count: AtomicU64::new(0),
        }
    }

    /// Append to the tail; returns the queue length after the append
    pub fn enqueue(&self, entry: LogEntry) -> usize {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        self.enqueue_count.fetch_add(1, Ordering::Relaxed);
        entries.len()
    }

    /// Remove up to `max` entries from the head
    pub fn take_batch(&self, max: usize) -> Batch {
        let mut entries = self.entries.lock();
        let count = max.min(entries.len());
        let taken: Vec<LogEntry> = entries.drain(..count).collect();
        self.taken_count.fetch_add(taken.len() as u64, Ordering::Relaxed);
        Batch::new(taken)
    }

    /// Put `entries` back at the head, ahead of everything queued, keeping
    /// their relative order
    pub fn requeue_front(&self, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }
        let count = entries.len() as u64;
        let mut queue = self.entries.lock();
        for entry in entries.into_iter().rev() {
            queue.push_front(entry);
        }
        self.requeue_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the current contents, head first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueue_count: self.enqueue_count.load(Ordering::Relaxed),
            taken_count: self.taken_count.load(Ordering::Relaxed),
            requeue_count: self.requeue_count.load(Ordering::Relaxed),
            current_size: self.len(),
        }
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Total entries enqueued
    pub enqueue_count: u64,

    /// Total entries taken into batches (including ones later requeued)
    pub taken_count: u64,

    /// Total entries requeued after failed deliveries
    pub requeue_count: u64,

    /// Current queue length
    pub current_size: usize,
}

impl QueueStats {
    /// Entries taken and not put back, i.e. delivered or in flight
    pub fn settled_count(&self) -> u64 {
        self.taken_count.saturating_sub(self.requeue_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::recorder::ActionType;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::Map;
    use ulid::Ulid;

    fn create_test_entry(page: &str) -> LogEntry {
        LogEntry {
            entry_id: Ulid::new(),
            action_type: ActionType::Click,
            timestamp: Utc::now(),
            page: page.to_string(),
            element_id: None,
            element_type: None,
            data: Map::new(),
            user_agent: "test".to_string(),
        }
    }

    fn pages(entries: &[LogEntry]) -> Vec<String> {
        entries.iter().map(|e| e.page.clone()).collect()
    }

    #[test]
    fn test_queue_creation() {
        let queue = PendingQueue::new();
        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());
        assert_eq!(queue.stats(), QueueStats::default());
    }

    #[test]
    fn test_enqueue_returns_length() {
        let queue = PendingQueue::new();
        assert_eq!(queue.enqueue(create_test_entry("a")), 1);
        assert_eq!(queue.enqueue(create_test_entry("b")), 2);
        assert!(!queue.is_empty());
    }

    #[test]
    fn test_take_batch_is_fifo() {
        let queue = PendingQueue::new();
        for page in ["a", "b", "c", "d"] {
            queue.enqueue(create_test_entry(page));
        }

        let batch = queue.take_batch(3);
        assert_eq!(pages(batch.entries()), vec!["a", "b", "c"]);
        assert_eq!(pages(&queue.snapshot()), vec!["d"]);
    }

    #[test]
    fn test_take_batch_larger_than_queue() {
        let queue = PendingQueue::new();
        queue.enqueue(create_test_entry("a"));

        let batch = queue.take_batch(10);
        assert_eq!(batch.len(), 1);
        assert!(queue.is_empty());

        let empty = queue.take_batch(10);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_requeue_front_goes_ahead_of_new_entries() {
        let queue = PendingQueue::new();
        for page in ["a", "b", "c"] {
            queue.enqueue(create_test_entry(page));
        }
        let batch = queue.take_batch(2);
        queue.enqueue(create_test_entry("new"));

        queue.requeue_front(batch.into_entries());
        assert_eq!(pages(&queue.snapshot()), vec!["a", "b", "c", "new"]);
    }

    #[test]
    fn test_stats() {
        let queue = PendingQueue::new();
        for page in ["a", "b", "c"] {
            queue.enqueue(create_test_entry(page));
        }
        let batch = queue.take_batch(2);
        queue.requeue_front(batch.into_entries());
        let _delivered = queue.take_batch(1);

        let stats = queue.stats();
        assert_eq!(stats.enqueue_count, 3);
        assert_eq!(stats.taken_count, 3);
        assert_eq!(stats.requeue_count, 2);
        assert_eq!(stats.current_size, 2);
        assert_eq!(stats.settled_count(), 1);
    }

    #[test]
    fn test_payload_shape() {
        let batch = Batch::new(vec![create_test_entry("a"), create_test_entry("b")]);
        let value = serde_json::to_value(batch.payload()).unwrap();
        let logs = value["logs"].as_array().unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0]["page"], "a");
        assert_eq!(logs[1]["page"], "b");
    }

    proptest! {
        #[test]
        fn prop_failed_batch_keeps_order_ahead_of_newer(
            initial in 0usize..30,
            batch_size in 1usize..15,
            arrived in 0usize..10,
        ) {
            let queue = PendingQueue::new();
            let mut expected = Vec::new();
            for i in 0..initial {
                let page = format!("old-{}", i);
                queue.enqueue(create_test_entry(&page));
                expected.push(page);
            }

            let batch = queue.take_batch(batch_size);
            for i in 0..arrived {
                let page = format!("new-{}", i);
                queue.enqueue(create_test_entry(&page));
                expected.push(page);
            }
            queue.requeue_front(batch.into_entries());

            prop_assert_eq!(pages(&queue.snapshot()), expected);
        }

        #[test]
        fn prop_successful_batches_never_reappear(
            total in 0usize..40,
            batch_size in 1usize..12,
        ) {
            let queue = PendingQueue::new();
            for i in 0..total {
                queue.enqueue(create_test_entry(&format!("e-{}", i)));
            }

            let mut delivered = Vec::new();
            loop {
                let batch = queue.take_batch(batch_size);
                if batch.is_empty() {
                    break;
                }
                prop_assert!(batch.len() <= batch_size);
                delivered.extend(pages(batch.entries()));
                let remaining = pages(&queue.snapshot());
                prop_assert!(remaining.iter().all(|p| !delivered.contains(p)));
            }
            prop_assert_eq!(delivered.len(), total);
        }
    }
}
