//! Batch record and its lifecycle.
//!
//! A batch moves `draft → planned → executing → {completed, failed}`.
//! [`BatchStatus::can_transition`] holds the legality rules. Stores refuse
//! any compare-and-set whose edge is not in it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy::Policy;

/// A collection of payout items progressed through one lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier for this batch
    pub id: Uuid,

    /// Platform that submitted the batch (part of every idempotency key)
    pub platform_id: String,

    /// Current lifecycle status
    pub status: BatchStatus,

    /// Policy captured when the batch was created
    pub policy: Policy,

    /// When the batch was created
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// Create a new draft batch
    pub fn new(platform_id: impl Into<String>, policy: Policy) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            platform_id: platform_id.into(),
            status: BatchStatus::Draft,
            policy,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle status of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Ingested, not yet planned
    Draft,

    /// Grouped into routes; ready for quoting and execution
    Planned,

    /// Execution in progress
    Executing,

    /// Execution finished with at least one success (or nothing to do)
    Completed,

    /// Every attempted item failed
    Failed,
}

impl BatchStatus {
    /// Whether `self → to` is a legal batch transition.
    ///
    /// `failed → planned` and `executing → planned` are the reopen edges;
    /// nothing leaves `completed`.
    pub fn can_transition(self, to: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, to),
            (Draft, Planned)
                | (Planned, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Failed, Planned)
                | (Executing, Planned)
        )
    }

    /// Check a transition, returning the offending pair on failure
    pub fn validate_transition(self, to: BatchStatus) -> Result<(), (BatchStatus, BatchStatus)> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err((self, to))
        }
    }

    /// Final batch status from the outcome of an execution pass.
    ///
    /// `failed` only when something failed and nothing succeeded; a mix of
    /// successes and failures is still `completed`.
    pub fn from_outcomes(succeeded: usize, failed: usize) -> Self {
        if failed > 0 && succeeded == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Draft => "draft",
            BatchStatus::Planned => "planned",
            BatchStatus::Executing => "executing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(BatchStatus::Draft),
            "planned" => Some(BatchStatus::Planned),
            "executing" => Some(BatchStatus::Executing),
            "completed" => Some(BatchStatus::Completed),
            "failed" => Some(BatchStatus::Failed),
            _ => None,
        }
    }
}

impl Default for BatchStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
