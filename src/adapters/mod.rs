//! Adapter interfaces for external systems.
//!
//! Adapters provide a unified interface for the collaborators the engine
//! drives: a quote provider (LI.FI) and a transfer executor (a relayer that
//! holds the funded signer, or the mock used for dry runs).

pub mod lifi;
pub mod mock;
pub mod relayer;

use alloy_primitives::U256;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::item::decimal_u256;

// Re-export the concrete adapters
pub use lifi::LifiQuoteProvider;
pub use mock::MockTransfer;
pub use relayer::RelayerTransferExecutor;

/// Parameters of a prospective cross-chain transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub from_chain: u64,
    pub to_chain: u64,
    /// Source token address
    pub from_token: String,
    /// Destination token address
    pub to_token: String,
    #[serde(with = "decimal_u256")]
    pub from_amount: U256,
    pub from_address: String,
    pub to_address: String,
}

/// Provider estimate for a transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub route_id: String,
    pub estimated_gas_cost_usd: Decimal,
    pub estimated_bridge_fee_usd: Decimal,
    #[serde(with = "decimal_u256")]
    pub estimated_output: U256,
    pub slippage_bps: u32,
    pub execution_time_seconds: u64,
    /// The request this quote answers
    pub request: QuoteRequest,
    /// Provider-specific transaction payload, carried through to execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_request: Option<serde_json::Value>,
}

impl Quote {
    /// Gas plus bridge fee
    pub fn total_fee_usd(&self) -> Decimal {
        self.estimated_gas_cost_usd + self.estimated_bridge_fee_usd
    }
}

/// An executable route derived from a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub from_chain: u64,
    pub to_chain: u64,
    pub from_token: String,
    pub to_token: String,
    #[serde(with = "decimal_u256")]
    pub from_amount: U256,
    pub from_address: String,
    pub to_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_request: Option<serde_json::Value>,
}

impl From<Quote> for Route {
    fn from(quote: Quote) -> Self {
        let request = quote.request;
        Self {
            id: quote.route_id,
            from_chain: request.from_chain,
            to_chain: request.to_chain,
            from_token: request.from_token,
            to_token: request.to_token,
            from_amount: request.from_amount,
            from_address: request.from_address,
            to_address: request.to_address,
            transaction_request: quote.transaction_request,
        }
    }
}

/// Outcome of a submitted transfer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    /// Source-chain transaction hash, if the executor already has one
    pub tx_hash: Option<String>,
    /// Destination-chain transaction hash, if known
    pub destination_tx_hash: Option<String>,
}

/// Supplies quotes for cross-chain transfers
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote>;
}

/// Submits transfers on-chain
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Human-readable executor name
    fn name(&self) -> &str;

    /// Submit `route`, signed by `signer_address`
    async fn submit(&self, route: &Route, signer_address: &str) -> Result<TransferReceipt>;
}
