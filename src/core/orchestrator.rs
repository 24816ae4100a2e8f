//! Batch orchestrator.
//!
//! The public face of the engine: plan, quote, execute, reopen and inspect
//! batches. Holds the store and collaborators behind trait objects so tests
//! can inject doubles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{QuoteProvider, TransferExecutor};
use crate::domain::{Batch, BatchStatus, ExecutionMetadata, ItemStatus, PayoutItem, Policy};
use crate::ingest::{self, IngestError, PayoutRow, SourceDefaults};
use crate::store::{ItemGuard, PayoutStore};

use super::error::PayoutError;
use super::executor::{BatchExecution, ExecutionConfig, ExecutionEngine, ExecutionResult};
use super::planner::{plan_payouts, PlanResult};
use super::policy::{check_payout, PayoutCheck, PolicyCheckResult};
use super::quoting::{QuoteAllResult, Quoter};
use super::registry::PriceTable;
use super::report::{export_items, BatchReport, ExportFormat};

/// Reason recorded on items stranded in `executing` by an interrupted run
pub const INTERRUPTED_REASON: &str = "interrupted";

/// Main payout orchestrator
pub struct Orchestrator {
    store: Arc<dyn PayoutStore>,
    engine: ExecutionEngine,
    quoter: Quoter,
    prices: PriceTable,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        store: Arc<dyn PayoutStore>,
        quotes: Arc<dyn QuoteProvider>,
        transfers: Option<Arc<dyn TransferExecutor>>,
        config: ExecutionConfig,
        prices: PriceTable,
    ) -> Self {
        let quoter = Quoter::new(store.clone(), quotes.clone(), config.chains.clone(), prices.clone());
        let engine = ExecutionEngine::new(store.clone(), quotes, transfers, config);
        Self {
            store,
            engine,
            quoter,
            prices,
        }
    }

    pub fn store(&self) -> &Arc<dyn PayoutStore> {
        &self.store
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Ingest validated rows as a new draft batch
    pub async fn create_batch(
        &self,
        platform_id: &str,
        rows: &[PayoutRow],
        policy: Policy,
        source: &SourceDefaults,
    ) -> Result<(Batch, Vec<PayoutItem>), IngestError> {
        ingest::create_batch(self.store.as_ref(), platform_id, rows, policy, source).await
    }

    async fn load_batch(&self, batch_id: Uuid) -> Result<Batch, PayoutError> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| PayoutError::batch_not_found(batch_id))
    }

    /// Group a draft batch into routes and move it to `planned`
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn plan(&self, batch_id: Uuid) -> Result<PlanResult, PayoutError> {
        let batch = self.load_batch(batch_id).await?;

        if batch.status != BatchStatus::Draft {
            return Err(PayoutError::InvalidState(format!(
                "cannot plan batch in '{}' status; it must be draft",
                batch.status
            )));
        }

        let items = self.store.list_items(batch_id).await?;
        let mut plan = plan_payouts(&items, &batch.policy, |token| self.prices.get(token))?;

        if !self
            .store
            .transition_batch(batch_id, BatchStatus::Draft, BatchStatus::Planned)
            .await?
        {
            return Err(PayoutError::InvalidState(format!(
                "batch {} was planned concurrently",
                batch_id
            )));
        }

        for group in &mut plan.groups {
            for item in &mut group.items {
                let guard = ItemGuard::of(item);
                item.execution.merge(ExecutionMetadata {
                    mode: Some(group.mode),
                    ..Default::default()
                });
                if !self.store.update_item(item, guard).await? {
                    return Err(PayoutError::InvalidState(format!(
                        "item {} changed status while planning",
                        item.id
                    )));
                }
            }
        }

        info!(
            groups = plan.groups.len(),
            hub = plan.summary.hub_mode_items,
            direct = plan.summary.direct_mode_items,
            "Batch planned"
        );

        Ok(plan)
    }

    /// Quote every item of a planned batch
    pub async fn quote_all(&self, batch_id: Uuid, from_address: Option<&str>) -> Result<QuoteAllResult, PayoutError> {
        self.quoter.quote_all(batch_id, from_address).await
    }

    /// Execute all eligible items of a planned batch
    pub async fn execute(&self, batch_id: Uuid, mock: bool) -> Result<BatchExecution, PayoutError> {
        self.engine.execute_batch(batch_id, mock).await
    }

    /// Execute a single item
    pub async fn execute_item(&self, item_id: Uuid, mock: bool) -> Result<ExecutionResult, PayoutError> {
        self.engine.execute_item(item_id, mock).await
    }

    /// Evaluate a payout against a policy
    pub fn check_policy(&self, payout: &PayoutCheck, policy: &Policy) -> PolicyCheckResult {
        check_payout(payout, policy)
    }

    /// Move a failed or abandoned batch back to `planned`.
    ///
    /// An `executing` batch counts as abandoned once nothing in it has
    /// changed for `stale_after`; a live run refreshes that on every claim.
    /// Items it left in `executing` become failed attempts.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn reopen(&self, batch_id: Uuid) -> Result<Batch, PayoutError> {
        let batch = self.load_batch(batch_id).await?;

        if batch.status == BatchStatus::Draft {
            return Err(PayoutError::InvalidState(
                "cannot reopen a draft batch; plan it instead".to_string(),
            ));
        }
        batch
            .status
            .validate_transition(BatchStatus::Planned)
            .map_err(|(from, _)| {
                PayoutError::InvalidState(format!("cannot reopen batch in '{}' status", from))
            })?;

        if batch.status == BatchStatus::Executing {
            let items = self.store.list_items(batch_id).await?;
            let idle = (Utc::now() - last_activity(&batch, &items))
                .to_std()
                .unwrap_or(Duration::ZERO);
            let stale_after = self.engine.config().stale_after;
            if idle < stale_after {
                return Err(PayoutError::InvalidState(format!(
                    "batch {} is still executing (idle {}s, reopen allowed after {}s)",
                    batch_id,
                    idle.as_secs(),
                    stale_after.as_secs()
                )));
            }

            for mut item in items {
                if item.status != ItemStatus::Executing {
                    continue;
                }
                let guard = ItemGuard::of(&item);
                item.status = ItemStatus::Failed;
                item.failed_reason = Some(INTERRUPTED_REASON.to_string());
                item.retry_count += 1;
                if self.store.update_item(&item, guard).await? {
                    warn!(item_id = %item.id, "Marked interrupted item as failed");
                }
            }
        }

        if !self
            .store
            .transition_batch(batch_id, batch.status, BatchStatus::Planned)
            .await?
        {
            return Err(PayoutError::InvalidState(format!(
                "batch {} changed status while reopening",
                batch_id
            )));
        }

        info!(from = %batch.status, "Batch reopened");
        self.load_batch(batch_id).await
    }

    /// Batch, items and per-status counts
    pub async fn status(&self, batch_id: Uuid) -> Result<BatchReport, PayoutError> {
        let batch = self.load_batch(batch_id).await?;
        let items = self.store.list_items(batch_id).await?;
        Ok(BatchReport::new(batch, items))
    }

    /// All batches, newest first
    pub async fn list_batches(&self) -> Result<Vec<Batch>, PayoutError> {
        Ok(self.store.list_batches().await?)
    }

    /// Render a batch's items as JSON or CSV
    pub async fn export(&self, batch_id: Uuid, format: ExportFormat) -> Result<String, PayoutError> {
        self.load_batch(batch_id).await?;
        let items = self.store.list_items(batch_id).await?;
        export_items(&items, format).map_err(|e| PayoutError::InvalidInput(format!("{:#}", e)))
    }
}

/// Most recent sign of life in a batch: its last status change or any claim
/// or completion among its items
fn last_activity(batch: &Batch, items: &[PayoutItem]) -> DateTime<Utc> {
    items
        .iter()
        .flat_map(|item| [item.execution.started_at, item.execution.executed_at])
        .flatten()
        .fold(batch.updated_at, |latest, at| latest.max(at))
}
