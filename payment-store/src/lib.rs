//! Process-local record of accepted payments and the summaries computed over it.
//!
//! The [`PaymentStore`] trait is the contract the router writes through and the
//! summary endpoints read through. [`InMemoryStore`] is the only backing store
//! shipped; it keeps per-route running totals next to the keyed records so the
//! unfiltered summary is answered without a scan.

mod memory;
mod types;

pub use memory::InMemoryStore;
pub use types::{PaymentRecord, PaymentSummary, Route, Summary, TimeWindow};

use async_trait::async_trait;
use uuid::Uuid;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("amount arithmetic overflowed")]
    Overflow,
    #[error("amount arithmetic would round: {0}")]
    PrecisionLoss(String),
    #[error("running totals disagree with stored records: {0}")]
    Inconsistent(String),
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts or replaces the record keyed by its correlation id, updating the
    /// running totals in the same step.
    async fn record(&self, record: PaymentRecord) -> Result<(), StoreError>;

    /// Summarizes the records whose `submitted_at` falls inside `window`.
    async fn summary(&self, window: TimeWindow) -> Result<PaymentSummary, StoreError>;

    async fn get(&self, correlation_id: Uuid) -> Result<Option<PaymentRecord>, StoreError>;

    /// Drops every record and resets the totals.
    async fn purge(&self) -> Result<(), StoreError>;
}
