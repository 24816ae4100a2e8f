//! Risk/compliance policy attached to every batch.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Limits a payout must satisfy before it is worth executing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Maximum total fee, in basis points of the payout value (default: 200)
    #[serde(default = "default_max_fee_bps")]
    pub max_fee_bps: u32,

    /// Maximum quoted slippage in basis points (default: 100)
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,

    /// Minimum payout value in USD (default: 50)
    #[serde(default = "default_min_payout_usd")]
    pub min_payout_usd: Decimal,

    /// Destination chain ids payouts may land on
    #[serde(default = "default_allowed_chains")]
    pub allowed_chains: Vec<u64>,

    /// Token symbols that may never be paid out (compared case-insensitively)
    #[serde(default)]
    pub banned_tokens: Vec<String>,

    /// Average per-item USD value above which a group executes DIRECT (default: 1000)
    #[serde(default = "default_hub_threshold_usd")]
    pub hub_threshold_usd: Decimal,
}

fn default_max_fee_bps() -> u32 {
    200
}
fn default_max_slippage_bps() -> u32 {
    100
}
fn default_min_payout_usd() -> Decimal {
    Decimal::from(50)
}
fn default_hub_threshold_usd() -> Decimal {
    Decimal::from(1000)
}

/// Base, Arbitrum, Polygon, Optimism
fn default_allowed_chains() -> Vec<u64> {
    vec![8453, 42161, 137, 10]
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_fee_bps: default_max_fee_bps(),
            max_slippage_bps: default_max_slippage_bps(),
            min_payout_usd: default_min_payout_usd(),
            allowed_chains: default_allowed_chains(),
            banned_tokens: Vec::new(),
            hub_threshold_usd: default_hub_threshold_usd(),
        }
    }
}

impl Policy {
    /// Whether payouts may land on `chain_id`
    pub fn allows_chain(&self, chain_id: u64) -> bool {
        self.allowed_chains.contains(&chain_id)
    }

    /// Whether `token` is on the banned list
    pub fn is_banned(&self, token: &str) -> bool {
        self.banned_tokens
            .iter()
            .any(|banned| banned.eq_ignore_ascii_case(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = Policy::default();
        assert_eq!(policy.max_fee_bps, 200);
        assert_eq!(policy.max_slippage_bps, 100);
        assert_eq!(policy.min_payout_usd, Decimal::from(50));
        assert_eq!(policy.hub_threshold_usd, Decimal::from(1000));
        assert!(policy.allows_chain(8453));
        assert!(!policy.allows_chain(1));
    }

    #[test]
    fn test_banned_tokens_ignore_case() {
        let policy = Policy {
            banned_tokens: vec!["USDT".to_string()],
            ..Default::default()
        };
        assert!(policy.is_banned("usdt"));
        assert!(policy.is_banned("USDT"));
        assert!(!policy.is_banned("USDC"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let policy: Policy = serde_yaml::from_str("maxFeeBps: 50\nbannedTokens: [DAI]\n").unwrap();
        assert_eq!(policy.max_fee_bps, 50);
        assert_eq!(policy.max_slippage_bps, 100);
        assert_eq!(policy.banned_tokens, vec!["DAI".to_string()]);
        assert_eq!(policy.allowed_chains, vec![8453, 42161, 137, 10]);
    }
}
