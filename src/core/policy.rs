//! Policy checker.
//!
//! A pure function over a payout's attributes and a [`Policy`]. Every rule is
//! evaluated; violations are collected rather than short-circuited.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Policy;

/// Attributes of a prospective payout, as seen by the policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutCheck {
    pub amount_usd: Decimal,
    pub fee_bps: u32,
    pub slippage_bps: u32,
    pub dest_chain_id: u64,
    pub token: String,
}

/// Which rule a payout broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    Amount,
    Fee,
    Slippage,
    Chain,
    Token,
}

/// A single broken rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub field: ViolationKind,
    pub message: String,
    pub value: String,
}

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCheckResult {
    pub valid: bool,
    pub violations: Vec<PolicyViolation>,
}

impl PolicyCheckResult {
    /// Whether a specific rule was broken
    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.field == kind)
    }
}

/// Evaluate a payout against a policy
pub fn check_payout(payout: &PayoutCheck, policy: &Policy) -> PolicyCheckResult {
    let mut violations = Vec::new();

    if payout.amount_usd < policy.min_payout_usd {
        violations.push(PolicyViolation {
            field: ViolationKind::Amount,
            message: format!(
                "Payout ${} below minimum ${}",
                payout.amount_usd, policy.min_payout_usd
            ),
            value: payout.amount_usd.to_string(),
        });
    }

    if payout.fee_bps > policy.max_fee_bps {
        violations.push(PolicyViolation {
            field: ViolationKind::Fee,
            message: format!(
                "Fee {}bps exceeds max {}bps",
                payout.fee_bps, policy.max_fee_bps
            ),
            value: payout.fee_bps.to_string(),
        });
    }

    if payout.slippage_bps > policy.max_slippage_bps {
        violations.push(PolicyViolation {
            field: ViolationKind::Slippage,
            message: format!(
                "Slippage {}bps exceeds max {}bps",
                payout.slippage_bps, policy.max_slippage_bps
            ),
            value: payout.slippage_bps.to_string(),
        });
    }

    if !policy.allows_chain(payout.dest_chain_id) {
        violations.push(PolicyViolation {
            field: ViolationKind::Chain,
            message: format!("Chain {} not in allowed list", payout.dest_chain_id),
            value: payout.dest_chain_id.to_string(),
        });
    }

    if policy.is_banned(&payout.token) {
        violations.push(PolicyViolation {
            field: ViolationKind::Token,
            message: format!("Token {} is banned", payout.token),
            value: payout.token.clone(),
        });
    }

    PolicyCheckResult {
        valid: violations.is_empty(),
        violations,
    }
}
