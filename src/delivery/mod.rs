//! Batch delivery
//!
//! - **Transport**: the seam the scheduler delivers through
//! - **HTTP Client**: JSON-over-HTTP implementation
//! - **Token**: anti-forgery token sources
//!
//! A delivery is all-or-nothing: `Ok` means the whole batch is done with,
//! `Err` means the whole batch goes back to the head of the queue.

pub mod client;
pub mod token;

use crate::recording::event_queue::Batch;
use crate::utils::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use client::{DeliveryConfig, HttpDeliveryClient};
pub use token::{NoToken, StaticToken, TokenSource};

/// Success body reported by the receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Entries the receiver says it stored; not reconciled against the batch
    #[serde(default)]
    pub logged_entries: Option<u64>,
}

/// Delivers one batch to the receiving collaborator
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, batch: &Batch) -> Result<DeliveryReceipt>;
}
