//! Core payout logic.
//!
//! This module contains:
//! - Policy: pure policy checks
//! - Planner: routing groups and execution modes
//! - Idempotency: stable per-row keys
//! - Quoting: per-item quotes and policy checks
//! - Executor: the execution engine
//! - Orchestrator: the public batch operations

pub mod error;
pub mod executor;
pub mod idempotency;
pub mod orchestrator;
pub mod planner;
pub mod policy;
pub mod quoting;
pub mod registry;
pub mod report;

// Re-export commonly used types
pub use error::PayoutError;
pub use executor::{
    BatchExecution, ExecutionConfig, ExecutionEngine, ExecutionResult, ExecutionSummary,
    DEFAULT_STALE_AFTER_SECS,
};
pub use idempotency::{generate_batch_keys, generate_key};
pub use orchestrator::Orchestrator;
pub use planner::{plan_payouts, PlanResult, PlanSummary, PlannedGroup, RoutingKey};
pub use policy::{check_payout, PayoutCheck, PolicyCheckResult, PolicyViolation, ViolationKind};
pub use quoting::{QuoteAllResult, QuoteEntry, QuoteSummary, Quoter};
pub use registry::{ChainInfo, ChainRegistry, PriceTable};
pub use report::{export_items, BatchReport, ExportFormat, ExportRow, StatusCounts};
