//! Relayer transfer executor.
//!
//! The funded key never enters this process: routes are posted to a relayer
//! service that signs and broadcasts them for the configured signer address.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Route, TransferExecutor, TransferReceipt};

/// HTTP client for a signing relayer
pub struct RelayerTransferExecutor {
    /// Relayer root URL
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    signer: &'a str,
    route: &'a Route,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    ok: bool,
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    destination_tx_hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl RelayerTransferExecutor {
    /// Create a new relayer client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build relayer HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl TransferExecutor for RelayerTransferExecutor {
    fn name(&self) -> &str {
        "relayer"
    }

    async fn submit(&self, route: &Route, signer_address: &str) -> Result<TransferReceipt> {
        let url = self.api_url("transfers");

        let response = self
            .client
            .post(&url)
            .json(&SubmitRequest {
                signer: signer_address,
                route,
            })
            .send()
            .await
            .with_context(|| format!("Failed to submit route {} to relayer", route.id))?;

        let result: SubmitResponse = response
            .json()
            .await
            .context("Failed to parse relayer response")?;

        if !result.ok {
            anyhow::bail!("Relayer rejected route {}: {}", route.id, result.error.unwrap_or_default());
        }

        info!(route_id = %route.id, tx_hash = ?result.tx_hash, "Route submitted");

        Ok(TransferReceipt {
            tx_hash: result.tx_hash,
            destination_tx_hash: result.destination_tx_hash,
        })
    }
}
