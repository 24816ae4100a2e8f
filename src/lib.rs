//! clearflow - Batched cross-chain payout orchestrator
//!
//! Takes a batch of payout instructions (recipient, destination chain,
//! token, amount), validates them against a per-batch policy, groups them
//! into routes, obtains quotes, and executes the transfers with exactly-once
//! semantics per item.
//!
//! # Architecture
//!
//! The system is built around a persistent store and two state machines:
//! - Batches move `draft → planned → executing → {completed, failed}`
//! - Items move `planned → quoted → executing → {completed, failed}`, with
//!   bounded retries on `failed → executing`
//! - Every transfer is preceded by an atomic claim in the store, and items
//!   whose idempotency key already completed are never paid twice
//!
//! # Modules
//!
//! - `adapters`: Quote provider (LI.FI), relayer and mock transfers
//! - `core`: Policy, planner, quoting, execution engine, orchestrator
//! - `domain`: Batch, item and policy types
//! - `ingest`: Payout CSV parsing and batch creation
//! - `store`: Persistence port with in-memory and SQLite backends
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! clearflow create payouts.csv --platform acme
//! clearflow plan <batch-id>
//! clearflow quote <batch-id>
//! clearflow execute <batch-id> --mock
//! clearflow status <batch-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{ExecutionConfig, ExecutionEngine, Orchestrator, PayoutError};
pub use domain::{Batch, BatchStatus, ItemStatus, PayoutItem, Policy};
pub use store::{MemoryStore, PayoutStore, SqliteStore, StoreError};
