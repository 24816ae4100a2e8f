//! Quoting pass over a planned batch.
//!
//! Each item gets a fresh quote, a policy check on the quoted fee and
//! slippage, and its route and fees merged into the execution metadata.
//! Failures are per item and never stop the pass.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{Quote, QuoteProvider, QuoteRequest};
use crate::domain::{BatchStatus, ExecutionFees, ExecutionMetadata, ItemStatus, PayoutItem, Policy};
use crate::store::{ItemGuard, PayoutStore};

use super::error::PayoutError;
use super::planner::units_to_usd;
use super::policy::{check_payout, PayoutCheck, PolicyViolation};
use super::registry::{ChainRegistry, PriceTable};

/// Flat gas estimate for a same-chain transfer
pub const SAME_CHAIN_GAS_USD: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Placeholder sender used when no address is given for quoting
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Quote outcome for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteEntry {
    pub item_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_bps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QuoteEntry {
    fn failed(item_id: Uuid, error: String) -> Self {
        Self {
            item_id,
            quote: None,
            fee_bps: None,
            policy_valid: None,
            error: Some(error),
        }
    }
}

/// Policy violations found for one quoted item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemViolations {
    pub item_id: Uuid,
    pub violations: Vec<PolicyViolation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummary {
    pub total: usize,
    pub quoted: usize,
    pub failed: usize,
    pub policy_issues: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteAllResult {
    pub quotes: Vec<QuoteEntry>,
    pub policy_violations: Vec<ItemViolations>,
    pub summary: QuoteSummary,
}

/// Total fee as basis points of the payout value, rounded
pub fn fee_bps(total_fee_usd: Decimal, payout_usd: Decimal) -> u32 {
    if payout_usd <= Decimal::ZERO {
        return if total_fee_usd > Decimal::ZERO { u32::MAX } else { 0 };
    }
    total_fee_usd
        .checked_div(payout_usd)
        .and_then(|ratio| ratio.checked_mul(Decimal::from(10_000)))
        .and_then(|bps| bps.round().to_u32())
        .unwrap_or(u32::MAX)
}

/// Quotes every item of a batch
pub struct Quoter {
    store: Arc<dyn PayoutStore>,
    quotes: Arc<dyn QuoteProvider>,
    chains: ChainRegistry,
    prices: PriceTable,
}

impl Quoter {
    pub fn new(
        store: Arc<dyn PayoutStore>,
        quotes: Arc<dyn QuoteProvider>,
        chains: ChainRegistry,
        prices: PriceTable,
    ) -> Self {
        Self {
            store,
            quotes,
            chains,
            prices,
        }
    }

    /// Quote every planned or quoted item of a planned batch
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn quote_all(&self, batch_id: Uuid, from_address: Option<&str>) -> Result<QuoteAllResult, PayoutError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| PayoutError::batch_not_found(batch_id))?;

        if batch.status != BatchStatus::Planned {
            return Err(PayoutError::InvalidState(format!(
                "cannot quote batch in '{}' status; it must be planned",
                batch.status
            )));
        }

        let from_address = from_address.unwrap_or(ZERO_ADDRESS);
        let items = self.store.list_items(batch_id).await?;
        let candidates: Vec<PayoutItem> = items
            .into_iter()
            .filter(|item| item.status.can_transition(ItemStatus::Quoted))
            .collect();

        let mut result = QuoteAllResult {
            quotes: Vec::with_capacity(candidates.len()),
            policy_violations: Vec::new(),
            summary: QuoteSummary {
                total: candidates.len(),
                ..Default::default()
            },
        };

        for item in candidates {
            let item_id = item.id;
            match self.quote_item(item, &batch.policy, from_address).await {
                Ok((entry, violations)) => {
                    result.summary.quoted += 1;
                    if let Some(violations) = violations {
                        result.summary.policy_issues += 1;
                        result.policy_violations.push(violations);
                    }
                    result.quotes.push(entry);
                }
                Err(e) => {
                    warn!(item_id = %item_id, error = %e, "Failed to quote item");
                    result.summary.failed += 1;
                    result.quotes.push(QuoteEntry::failed(item_id, e.to_string()));
                }
            }
        }

        info!(
            quoted = result.summary.quoted,
            failed = result.summary.failed,
            policy_issues = result.summary.policy_issues,
            "Quoting finished"
        );

        Ok(result)
    }

    async fn quote_item(
        &self,
        mut item: PayoutItem,
        policy: &Policy,
        from_address: &str,
    ) -> Result<(QuoteEntry, Option<ItemViolations>), PayoutError> {
        let (from_token, to_token) = self.chains.resolve_pair(&item)?;

        let request = QuoteRequest {
            from_chain: item.source.chain_id,
            to_chain: item.recipient.chain_id,
            from_token,
            to_token,
            from_amount: item.source.amount,
            from_address: from_address.to_string(),
            to_address: item.recipient.address.clone(),
        };

        let quote = if item.is_same_chain() {
            debug!(item_id = %item.id, "Same-chain item; using flat gas estimate");
            Quote {
                route_id: format!("same-chain-{}", item.id),
                estimated_gas_cost_usd: SAME_CHAIN_GAS_USD,
                estimated_bridge_fee_usd: Decimal::ZERO,
                estimated_output: item.source.amount,
                slippage_bps: 0,
                execution_time_seconds: 0,
                request,
                transaction_request: None,
            }
        } else {
            self.quotes.get_quote(&request).await?
        };

        let payout_usd = units_to_usd(
            item.source.amount,
            self.prices.price_or_parity(&item.recipient.token),
        );
        let bps = fee_bps(quote.total_fee_usd(), payout_usd);

        let check = check_payout(
            &PayoutCheck {
                amount_usd: payout_usd,
                fee_bps: bps,
                slippage_bps: quote.slippage_bps,
                dest_chain_id: item.recipient.chain_id,
                token: item.recipient.token.clone(),
            },
            policy,
        );

        let violations = if check.valid {
            None
        } else {
            warn!(
                item_id = %item.id,
                violations = check.violations.len(),
                "Quoted item breaks batch policy"
            );
            Some(ItemViolations {
                item_id: item.id,
                violations: check.violations,
            })
        };

        // Status and metadata land in one conditional write; an item claimed
        // for execution since it was read is left alone
        let guard = ItemGuard::of(&item);
        item.status = ItemStatus::Quoted;
        item.execution.merge(ExecutionMetadata {
            route_id: Some(quote.route_id.clone()),
            quoted_at: Some(Utc::now()),
            fees: ExecutionFees {
                gas_cost_usd: Some(quote.estimated_gas_cost_usd),
                bridge_fee_usd: Some(quote.estimated_bridge_fee_usd),
            },
            ..Default::default()
        });
        if !self.store.update_item(&item, guard).await? {
            return Err(PayoutError::InvalidState(format!(
                "item {} changed status while quoting",
                item.id
            )));
        }

        Ok((
            QuoteEntry {
                item_id: item.id,
                quote: Some(quote),
                fee_bps: Some(bps),
                policy_valid: Some(check.valid),
                error: None,
            },
            violations,
        ))
    }
}
