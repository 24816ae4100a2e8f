//! Persistence port for batches and payout items.
//!
//! The store is the only shared mutable state in the system. Every write
//! that changes a status is conditional on the status the caller read, and
//! is refused outright when the edge is not in the domain transition tables.
//! Item writes are additionally fenced on the retry count, which is unique
//! per execution attempt, so a run whose claim was revoked cannot record.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Batch, BatchStatus, ItemStatus, PayoutItem};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("Record already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Illegal {record} transition: {from} -> {to}")]
    IllegalTransition {
        record: &'static str,
        from: &'static str,
        to: &'static str,
    },
}

/// The stored state an item write is conditioned on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemGuard {
    pub status: ItemStatus,
    pub retry_count: u32,
}

impl ItemGuard {
    /// Guard matching `item` as it was read
    pub fn of(item: &PayoutItem) -> Self {
        Self {
            status: item.status,
            retry_count: item.retry_count,
        }
    }
}

pub(crate) fn check_batch_edge(from: BatchStatus, to: BatchStatus) -> Result<(), StoreError> {
    from.validate_transition(to)
        .map_err(|(from, to)| StoreError::IllegalTransition {
            record: "batch",
            from: from.as_str(),
            to: to.as_str(),
        })
}

/// Same-status writes are metadata updates and always allowed
pub(crate) fn check_item_edge(from: ItemStatus, to: ItemStatus) -> Result<(), StoreError> {
    if from == to || from.can_transition(to) {
        Ok(())
    } else {
        Err(StoreError::IllegalTransition {
            record: "item",
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

/// Read/write access to batches and their items
#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Insert a batch together with all of its items, atomically
    async fn create_batch(&self, batch: &Batch, items: &[PayoutItem]) -> Result<(), StoreError>;

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, StoreError>;

    /// All batches, newest first
    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError>;

    /// Move a batch from `from` to `to` only if it is currently `from`.
    /// Returns whether the update happened; illegal edges are an error.
    async fn transition_batch(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
    ) -> Result<bool, StoreError>;

    async fn get_item(&self, id: Uuid) -> Result<Option<PayoutItem>, StoreError>;

    /// Items of a batch in stored (row) order
    async fn list_items(&self, batch_id: Uuid) -> Result<Vec<PayoutItem>, StoreError>;

    /// A completed item carrying this idempotency key, if any
    async fn find_completed_by_key(&self, key: &str) -> Result<Option<PayoutItem>, StoreError>;

    /// Write an item's status, retry count, failure reason and execution
    /// metadata, only if the stored item still matches `guard`.
    /// Returns whether the write happened.
    async fn update_item(&self, item: &PayoutItem, guard: ItemGuard) -> Result<bool, StoreError>;
}
