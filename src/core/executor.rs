//! Execution engine for payout items and batches.
//!
//! Every external transfer is guarded by an atomic `→ executing` claim in the
//! store. A claimed item whose idempotency key already has a completed twin is
//! completed from that record instead of being paid again. Outcomes are only
//! recorded against the claim that produced them; a run whose claim was
//! revoked by `reopen` records nothing and stops.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{MockTransfer, QuoteProvider, QuoteRequest, Route, TransferExecutor};
use crate::domain::{
    BatchStatus, ExecutionFees, ExecutionMetadata, ItemStatus, PayoutItem, DEFAULT_MAX_RETRIES,
};
use crate::store::{ItemGuard, PayoutStore};

use super::error::PayoutError;
use super::registry::ChainRegistry;

/// Default idle time before an executing batch may be reopened
pub const DEFAULT_STALE_AFTER_SECS: u64 = 900;

/// Engine configuration, passed in at construction
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Supported chains and their token addresses
    pub chains: ChainRegistry,

    /// Address the relayer signs for; required for live execution
    pub signer_address: Option<String>,

    /// Failed attempts allowed per item
    pub max_retries: u32,

    /// Artificial latency of mock transfers
    pub mock_delay: Duration,

    /// Idle time after which an `executing` batch counts as abandoned and
    /// may be reopened. Must exceed the transfer collaborator's timeout.
    pub stale_after: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            chains: ChainRegistry::defaults(),
            signer_address: None,
            max_retries: DEFAULT_MAX_RETRIES,
            mock_delay: Duration::from_millis(1000),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

impl ExecutionConfig {
    /// Signer for transfers out of `chain_id`
    pub fn signer_for(&self, chain_id: u64) -> Result<&str, PayoutError> {
        if !self.chains.is_supported(chain_id) {
            return Err(PayoutError::Collaborator(format!(
                "No signer configured for chain {}",
                chain_id
            )));
        }
        self.signer_address
            .as_deref()
            .ok_or_else(|| PayoutError::Collaborator("No signer address configured".to_string()))
    }
}

/// Outcome of one item execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub item_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    fn succeeded(item_id: Uuid, tx_hash: Option<String>) -> Self {
        Self {
            item_id,
            success: true,
            tx_hash,
            error: None,
        }
    }

    fn failed(item_id: Uuid, error: String) -> Self {
        Self {
            item_id,
            success: false,
            tx_hash: None,
            error: Some(error),
        }
    }
}

/// Counts over the items a batch run attempted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Result of a batch execution pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExecution {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub results: Vec<ExecutionResult>,
    pub summary: ExecutionSummary,
}

/// What a successful transfer attempt produced
struct TransferOutcome {
    /// `None` only when reusing a completed twin that recorded no hash
    tx_hash: Option<String>,
    destination_tx_hash: Option<String>,
    route_id: Option<String>,
    fees: ExecutionFees,
}

/// Drives items through quoting-to-transfer and batches through execution
pub struct ExecutionEngine {
    store: Arc<dyn PayoutStore>,
    quotes: Arc<dyn QuoteProvider>,
    /// Live transfer path; `None` leaves only mock mode available
    transfers: Option<Arc<dyn TransferExecutor>>,
    mock: MockTransfer,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn PayoutStore>,
        quotes: Arc<dyn QuoteProvider>,
        transfers: Option<Arc<dyn TransferExecutor>>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            store,
            quotes,
            transfers,
            mock: MockTransfer::new(config.mock_delay),
            config,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Execute a single item.
    ///
    /// Completed items return their recorded transaction without side effects.
    /// Transfer failures are recorded on the item and returned as a failed
    /// result; only state and lookup problems surface as `Err`.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn execute_item(&self, item_id: Uuid, mock: bool) -> Result<ExecutionResult, PayoutError> {
        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or_else(|| PayoutError::item_not_found(item_id))?;

        if item.status == ItemStatus::Completed {
            debug!("Item already completed");
            return Ok(ExecutionResult::succeeded(item_id, item.tx_hash().map(String::from)));
        }

        let guard = ItemGuard::of(&item);
        item.status
            .validate_transition(ItemStatus::Executing, item.retry_count, self.config.max_retries)
            .map_err(|(from, _)| {
                if from == ItemStatus::Failed {
                    PayoutError::InvalidState(format!(
                        "item {} exhausted its retry budget ({} of {})",
                        item_id, item.retry_count, self.config.max_retries
                    ))
                } else {
                    PayoutError::InvalidState(format!(
                        "cannot execute item {} in '{}' status",
                        item_id, from
                    ))
                }
            })?;

        let mut item = item;
        item.status = ItemStatus::Executing;
        item.execution.merge(ExecutionMetadata {
            started_at: Some(Utc::now()),
            ..Default::default()
        });

        // Claim the item before anything leaves the process
        if !self.store.update_item(&item, guard).await? {
            return Err(PayoutError::InvalidState(format!(
                "item {} was claimed by another execution",
                item_id
            )));
        }

        info!(
            retry_count = item.retry_count,
            mock,
            "Executing payout item"
        );

        let outcome = match self.store.find_completed_by_key(&item.idempotency_key).await {
            Ok(Some(prior)) => {
                info!(prior_item = %prior.id, "Idempotency key already completed; reusing its transaction");
                Ok(TransferOutcome {
                    tx_hash: prior.tx_hash().map(String::from),
                    destination_tx_hash: prior.execution.destination_tx_hash.clone(),
                    route_id: prior.execution.route_id.clone(),
                    fees: ExecutionFees::default(),
                })
            }
            Ok(None) => self.transfer(&item, mock).await,
            Err(e) => Err(PayoutError::Store(e)),
        };

        self.record_outcome(item, outcome).await
    }

    /// Run the external part of an attempt
    async fn transfer(&self, item: &PayoutItem, mock: bool) -> Result<TransferOutcome, PayoutError> {
        if mock {
            let tx_hash = self.mock.execute(&item.idempotency_key).await;
            return Ok(TransferOutcome {
                tx_hash: Some(tx_hash),
                destination_tx_hash: None,
                route_id: None,
                fees: ExecutionFees::default(),
            });
        }

        let transfers = self
            .transfers
            .as_ref()
            .ok_or_else(|| PayoutError::Collaborator("No transfer executor configured".to_string()))?;

        let (from_token, to_token) = self.config.chains.resolve_pair(item)?;
        let signer = self.config.signer_for(item.source.chain_id)?;

        let request = QuoteRequest {
            from_chain: item.source.chain_id,
            to_chain: item.recipient.chain_id,
            from_token,
            to_token,
            from_amount: item.source.amount,
            from_address: signer.to_string(),
            to_address: item.recipient.address.clone(),
        };

        let quote = self.quotes.get_quote(&request).await?;
        let fees = ExecutionFees {
            gas_cost_usd: Some(quote.estimated_gas_cost_usd),
            bridge_fee_usd: Some(quote.estimated_bridge_fee_usd),
        };
        let route = Route::from(quote);
        let route_id = route.id.clone();

        debug!(route_id = %route_id, executor = transfers.name(), "Submitting route");
        let receipt = transfers.submit(&route, signer).await?;

        let tx_hash = receipt
            .tx_hash
            .unwrap_or_else(|| format!("pending-{}", Utc::now().timestamp_millis()));

        Ok(TransferOutcome {
            tx_hash: Some(tx_hash),
            destination_tx_hash: receipt.destination_tx_hash,
            route_id: Some(route_id),
            fees,
        })
    }

    /// Persist the end state of a claimed item, if the claim still holds
    async fn record_outcome(
        &self,
        mut item: PayoutItem,
        outcome: Result<TransferOutcome, PayoutError>,
    ) -> Result<ExecutionResult, PayoutError> {
        let claim = ItemGuard::of(&item);
        let result = match outcome {
            Ok(done) => {
                item.status = ItemStatus::Completed;
                item.failed_reason = None;
                item.execution.merge(ExecutionMetadata {
                    route_id: done.route_id,
                    bridge_tx_hash: done.tx_hash.clone(),
                    destination_tx_hash: done.destination_tx_hash,
                    fees: done.fees,
                    executed_at: Some(Utc::now()),
                    ..Default::default()
                });
                info!(tx_hash = ?done.tx_hash, "Payout item completed");
                ExecutionResult::succeeded(item.id, done.tx_hash)
            }
            Err(e) => {
                let reason = e.to_string();
                item.status = ItemStatus::Failed;
                item.failed_reason = Some(reason.clone());
                item.retry_count += 1;
                if e.is_item_level() {
                    warn!(retry_count = item.retry_count, error = %reason, "Payout item failed");
                } else {
                    error!(retry_count = item.retry_count, error = %reason, "Payout item failed outside the transfer");
                }
                ExecutionResult::failed(item.id, reason)
            }
        };

        if !self.store.update_item(&item, claim).await? {
            error!(
                tx_hash = ?result.tx_hash,
                error = ?result.error,
                "Claim was revoked during the attempt; outcome not recorded"
            );
            return Err(PayoutError::ClaimRevoked(item.id));
        }
        Ok(result)
    }

    /// Execute every eligible item of a planned batch, in row order.
    ///
    /// One item's failure never stops the others. The batch ends `failed`
    /// only when something failed and nothing succeeded. A run that finds
    /// one of its claims revoked has been superseded by a reopen; it stops
    /// and leaves the batch status to the run that took over.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn execute_batch(&self, batch_id: Uuid, mock: bool) -> Result<BatchExecution, PayoutError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| PayoutError::batch_not_found(batch_id))?;

        batch
            .status
            .validate_transition(BatchStatus::Executing)
            .map_err(|(from, _)| {
                PayoutError::InvalidState(format!(
                    "cannot execute a batch that is not planned (status: {})",
                    from
                ))
            })?;

        if !self
            .store
            .transition_batch(batch_id, BatchStatus::Planned, BatchStatus::Executing)
            .await?
        {
            return Err(PayoutError::InvalidState(format!(
                "batch {} is already being executed",
                batch_id
            )));
        }

        info!(mock, "Starting batch execution");

        let items = self.store.list_items(batch_id).await?;
        let eligible: Vec<&PayoutItem> = items
            .iter()
            .filter(|item| item.is_eligible(self.config.max_retries))
            .collect();

        debug!(eligible = eligible.len(), total = items.len(), "Selected eligible items");

        let mut results = Vec::with_capacity(eligible.len());
        for item in eligible {
            let result = match self.execute_item(item.id, mock).await {
                Ok(result) => result,
                Err(PayoutError::ClaimRevoked(id)) => {
                    warn!(item_id = %id, "Batch run superseded by a reopen; stopping");
                    return Err(PayoutError::ClaimRevoked(id));
                }
                Err(e) => {
                    error!(item_id = %item.id, error = %e, "Item execution aborted");
                    ExecutionResult::failed(item.id, e.to_string())
                }
            };
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let summary = ExecutionSummary {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        };

        let status = BatchStatus::from_outcomes(summary.succeeded, summary.failed);
        BatchStatus::Executing
            .validate_transition(status)
            .map_err(|(from, to)| {
                PayoutError::InvalidState(format!("batch cannot move from '{}' to '{}'", from, to))
            })?;
        if !self
            .store
            .transition_batch(batch_id, BatchStatus::Executing, status)
            .await?
        {
            return Err(PayoutError::InvalidState(format!(
                "batch {} left 'executing' during the run",
                batch_id
            )));
        }

        info!(
            %status,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Batch execution finished"
        );

        Ok(BatchExecution {
            batch_id,
            status,
            results,
            summary,
        })
    }
}
