//! Error taxonomy for payout operations.

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Errors surfaced by the orchestrator and the execution engine.
///
/// `InvalidState` and `NotFound` abort an operation before any mutation.
/// `UnsupportedToken` and `Collaborator` are item-level: batch loops record
/// them on the item and carry on. `ClaimRevoked` means another run took the
/// item over; the run that hits it stops.
#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Token not supported: {token} on chain {chain_id}")]
    UnsupportedToken { chain_id: u64, token: String },

    #[error("{0}")]
    Collaborator(String),

    #[error("Amount overflow while aggregating {0}")]
    AmountOverflow(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Claim on item {0} was revoked before its outcome was recorded")]
    ClaimRevoked(Uuid),
}

impl PayoutError {
    pub fn batch_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "Batch", id }
    }

    pub fn item_not_found(id: Uuid) -> Self {
        Self::NotFound { kind: "Item", id }
    }

    /// Whether the error belongs to a single item rather than the whole operation
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            PayoutError::UnsupportedToken { .. } | PayoutError::Collaborator(_)
        )
    }
}

impl From<anyhow::Error> for PayoutError {
    fn from(err: anyhow::Error) -> Self {
        // Keep the whole context chain in the recorded reason
        PayoutError::Collaborator(format!("{:#}", err))
    }
}
