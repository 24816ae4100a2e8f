//! Domain types for the payout orchestrator.
//!
//! This module contains the core data structures:
//! - Batch: a collection of payouts and its lifecycle
//! - PayoutItem: one transfer and its lifecycle
//! - Policy: limits a payout must satisfy

pub mod batch;
pub mod item;
pub mod policy;

// Re-export commonly used types
pub use batch::{Batch, BatchStatus};
pub use item::{
    ExecutionFees, ExecutionMetadata, ExecutionMode, ItemStatus, PayoutItem, Recipient, Source,
    DEFAULT_MAX_RETRIES,
};
pub use policy::Policy;
