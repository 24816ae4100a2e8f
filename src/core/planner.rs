//! Route planning.
//!
//! Groups payout items by routing key (source chain, destination chain,
//! destination token), sums each group exactly, and picks an execution mode.
//! Pure: persisting the plan and moving the batch to `planned` is the caller's job.

use std::collections::{HashMap, HashSet};

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::item::decimal_u256;
use crate::domain::{ExecutionMode, PayoutItem, Policy};

use super::error::PayoutError;

/// Assumed decimal scale of on-chain token amounts
pub const AMOUNT_DECIMALS: u32 = 6;

/// Grouping key for planning
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingKey {
    pub source_chain_id: u64,
    pub dest_chain_id: u64,
    pub dest_token: String,
}

impl RoutingKey {
    pub fn of(item: &PayoutItem) -> Self {
        Self {
            source_chain_id: item.source.chain_id,
            dest_chain_id: item.recipient.chain_id,
            dest_token: item.recipient.token.clone(),
        }
    }
}

/// Items sharing a routing key, with their execution mode
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedGroup {
    #[serde(flatten)]
    pub key: RoutingKey,
    pub mode: ExecutionMode,
    pub items: Vec<PayoutItem>,
    /// Exact sum of member amounts in base units
    #[serde(with = "decimal_u256")]
    pub total_amount: U256,
    /// Average per-item value used for the mode decision
    pub average_usd: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub total_items: usize,
    pub hub_mode_items: usize,
    pub direct_mode_items: usize,
    pub unique_dest_chains: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub groups: Vec<PlannedGroup>,
    pub summary: PlanSummary,
}

/// DIRECT for large average payouts or a lone recipient, HUB otherwise
pub fn decide_mode(average_usd: Decimal, item_count: usize, threshold_usd: Decimal) -> ExecutionMode {
    if average_usd > threshold_usd || item_count == 1 {
        ExecutionMode::Direct
    } else {
        ExecutionMode::Hub
    }
}

/// USD value of a base-unit amount at `price`.
///
/// Saturates at `Decimal::MAX` for amounts beyond Decimal's range; those are
/// far above any mode threshold.
pub fn units_to_usd(amount: U256, price: Decimal) -> Decimal {
    amount
        .to_string()
        .parse::<i128>()
        .ok()
        .and_then(|units| Decimal::try_from_i128_with_scale(units, AMOUNT_DECIMALS).ok())
        .and_then(|tokens| tokens.checked_mul(price))
        .unwrap_or(Decimal::MAX)
}

/// Exact sum of item amounts
pub fn sum_amounts<'a>(items: impl IntoIterator<Item = &'a PayoutItem>) -> Result<U256, PayoutError> {
    items.into_iter().try_fold(U256::ZERO, |acc, item| {
        acc.checked_add(item.source.amount)
            .ok_or_else(|| PayoutError::AmountOverflow(format!("item {}", item.id)))
    })
}

/// Group items by routing key and assign execution modes.
///
/// `price` maps a token symbol to its USD price; unknown tokens are treated
/// as stablecoins at parity. Group order follows first appearance, and items
/// keep their input order within a group.
pub fn plan_payouts<F>(items: &[PayoutItem], policy: &Policy, price: F) -> Result<PlanResult, PayoutError>
where
    F: Fn(&str) -> Option<Decimal>,
{
    let mut order: Vec<RoutingKey> = Vec::new();
    let mut grouped: HashMap<RoutingKey, Vec<PayoutItem>> = HashMap::new();

    for item in items {
        let key = RoutingKey::of(item);
        grouped
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(item.clone());
    }

    let mut groups = Vec::with_capacity(order.len());
    let mut summary = PlanSummary {
        total_items: items.len(),
        ..Default::default()
    };

    for key in order {
        let members = grouped.remove(&key).unwrap_or_default();
        let total_amount = sum_amounts(&members)?;

        let token_price = price(&key.dest_token).unwrap_or(Decimal::ONE);
        let total_usd = units_to_usd(total_amount, token_price);
        let average_usd = total_usd
            .checked_div(Decimal::from(members.len()))
            .unwrap_or(Decimal::ZERO);

        let mode = decide_mode(average_usd, members.len(), policy.hub_threshold_usd);
        match mode {
            ExecutionMode::Hub => summary.hub_mode_items += members.len(),
            ExecutionMode::Direct => summary.direct_mode_items += members.len(),
        }

        groups.push(PlannedGroup {
            key,
            mode,
            items: members,
            total_amount,
            average_usd,
        });
    }

    summary.unique_dest_chains = groups
        .iter()
        .map(|g| g.key.dest_chain_id)
        .collect::<HashSet<_>>()
        .len();

    Ok(PlanResult { groups, summary })
}
