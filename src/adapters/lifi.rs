//! LI.FI quote provider.
//!
//! Calls the public REST endpoint `GET {base_url}/quote` and maps the
//! estimate into a [`Quote`]. Timeouts belong to the HTTP client.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::U256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::{Quote, QuoteProvider, QuoteRequest};

/// LI.FI REST client
pub struct LifiQuoteProvider {
    /// API root, e.g. `https://li.quest/v1`
    base_url: String,
    /// Integrator tag sent with every request
    integrator: String,
    /// HTTP client
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiQuote {
    id: String,
    estimate: LifiEstimate,
    #[serde(default)]
    transaction_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiEstimate {
    to_amount: String,
    #[serde(default)]
    execution_duration: Option<f64>,
    #[serde(default)]
    gas_costs: Vec<LifiCost>,
    #[serde(default)]
    fee_costs: Vec<LifiCost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiCost {
    #[serde(rename = "amountUSD")]
    amount_usd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LifiError {
    message: Option<String>,
}

impl LifiQuoteProvider {
    /// Create a new client with a request timeout
    pub fn new(base_url: impl Into<String>, integrator: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build LI.FI HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            integrator: integrator.into(),
            client,
        })
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn into_quote(raw: LifiQuote, request: &QuoteRequest) -> Result<Quote> {
        let estimated_output = U256::from_str(&raw.estimate.to_amount)
            .with_context(|| format!("Invalid toAmount '{}'", raw.estimate.to_amount))?;

        Ok(Quote {
            route_id: raw.id,
            estimated_gas_cost_usd: first_cost_usd(&raw.estimate.gas_costs),
            estimated_bridge_fee_usd: first_cost_usd(&raw.estimate.fee_costs),
            estimated_output,
            slippage_bps: slippage_bps(request.from_amount, estimated_output),
            execution_time_seconds: raw.estimate.execution_duration.unwrap_or(0.0).max(0.0) as u64,
            request: request.clone(),
            transaction_request: raw.transaction_request,
        })
    }
}

/// USD amount of the first cost entry, zero when absent or unparseable
fn first_cost_usd(costs: &[LifiCost]) -> Decimal {
    costs
        .first()
        .and_then(|c| c.amount_usd.as_deref())
        .and_then(|raw| Decimal::from_str(raw).ok())
        .unwrap_or(Decimal::ZERO)
}

/// Shortfall of `output` against `input` in basis points, rounded, never negative
pub fn slippage_bps(input: U256, output: U256) -> u32 {
    if input.is_zero() || output >= input {
        return 0;
    }
    let shortfall = input - output;
    let bps = (shortfall * U256::from(10_000u64) + input / U256::from(2u64)) / input;
    u32::try_from(bps).unwrap_or(u32::MAX)
}

#[async_trait]
impl QuoteProvider for LifiQuoteProvider {
    fn name(&self) -> &str {
        "lifi"
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let url = self.api_url("quote");
        debug!(from_chain = request.from_chain, to_chain = request.to_chain, "Requesting LI.FI quote");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("fromChain", request.from_chain.to_string()),
                ("toChain", request.to_chain.to_string()),
                ("fromToken", request.from_token.clone()),
                ("toToken", request.to_token.clone()),
                ("fromAmount", request.from_amount.to_string()),
                ("fromAddress", request.from_address.clone()),
                ("toAddress", request.to_address.clone()),
                ("integrator", self.integrator.clone()),
            ])
            .send()
            .await
            .context("Failed to request LI.FI quote")?;

        let status = response.status();
        if !status.is_success() {
            let body: Option<LifiError> = response.json().await.ok();
            anyhow::bail!(
                "LI.FI quote failed ({}): {}",
                status,
                body.and_then(|b| b.message).unwrap_or_default()
            );
        }

        let raw: LifiQuote = response
            .json()
            .await
            .context("Failed to parse LI.FI quote response")?;

        Self::into_quote(raw, request)
    }
}
