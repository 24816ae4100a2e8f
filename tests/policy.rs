//! Policy Integration Tests
//!
//! Rule evaluation and mode decisions through the public API.

use clearflow::core::planner::decide_mode;
use clearflow::core::{check_payout, PayoutCheck, ViolationKind};
use clearflow::domain::ExecutionMode;
use clearflow::Policy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn payout(amount_usd: Decimal, fee_bps: u32, dest_chain_id: u64, token: &str) -> PayoutCheck {
    PayoutCheck {
        amount_usd,
        fee_bps,
        slippage_bps: 10,
        dest_chain_id,
        token: token.to_string(),
    }
}

#[test]
fn test_all_violations_reported_at_once() {
    let result = check_payout(&payout(dec!(10), 300, 1, "USDC"), &Policy::default());

    assert!(!result.valid);
    assert_eq!(result.violations.len(), 3);
    assert!(result.has(ViolationKind::Amount));
    assert!(result.has(ViolationKind::Fee));
    assert!(result.has(ViolationKind::Chain));
}

#[test]
fn test_valid_payout() {
    let result = check_payout(&payout(dec!(500), 40, 42161, "USDC"), &Policy::default());
    assert!(result.valid);
    assert!(result.violations.is_empty());
}

#[test]
fn test_banned_token_is_case_insensitive() {
    let policy = Policy {
        banned_tokens: vec!["usdt".to_string()],
        ..Policy::default()
    };
    let result = check_payout(&payout(dec!(500), 40, 42161, "USDT"), &policy);
    assert_eq!(result.violations.len(), 1);
    assert!(result.has(ViolationKind::Token));
}

#[test]
fn test_boundaries_are_inclusive() {
    let policy = Policy::default();
    let at_limits = PayoutCheck {
        amount_usd: policy.min_payout_usd,
        fee_bps: policy.max_fee_bps,
        slippage_bps: policy.max_slippage_bps,
        dest_chain_id: 8453,
        token: "USDC".to_string(),
    };
    assert!(check_payout(&at_limits, &policy).valid);
}

#[test]
fn test_mode_decisions() {
    let threshold = Policy::default().hub_threshold_usd;
    assert_eq!(decide_mode(dec!(5), 1, threshold), ExecutionMode::Direct);
    assert_eq!(decide_mode(dec!(200), 5, threshold), ExecutionMode::Hub);
    assert_eq!(decide_mode(dec!(1500), 2, threshold), ExecutionMode::Direct);
    assert_eq!(decide_mode(dec!(1000), 2, threshold), ExecutionMode::Hub);
}
