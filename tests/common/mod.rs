//! Shared fixtures and collaborator doubles for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use clearflow::adapters::{Quote, QuoteProvider, QuoteRequest, Route, TransferExecutor, TransferReceipt};
use clearflow::core::{ExecutionConfig, Orchestrator, PriceTable};
use clearflow::ingest::{PayoutRow, SourceDefaults};
use clearflow::{MemoryStore, PayoutStore, Policy};

pub const SIGNER: &str = "0x9999999999999999999999999999999999999999";
pub const PLATFORM: &str = "acme";

/// Base units for a whole number of 6-decimal tokens
pub fn usd(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000u64)
}

pub fn address(n: u8) -> String {
    format!("0x{:040x}", n)
}

pub fn row(n: u8, chain_id: u64, amount: U256) -> PayoutRow {
    PayoutRow {
        recipient_address: address(n),
        destination_chain_id: chain_id,
        preferred_token: "USDC".to_string(),
        amount,
    }
}

pub fn base_usdc() -> SourceDefaults {
    SourceDefaults {
        chain_id: 8453,
        token: "USDC".to_string(),
    }
}

/// Quote provider returning fixed fees, optionally failing for some chains
pub struct ScriptedQuotes {
    pub calls: AtomicUsize,
    pub gas_usd: Decimal,
    pub bridge_fee_usd: Decimal,
    pub failing_chains: Vec<u64>,
    pub delay: Duration,
}

impl ScriptedQuotes {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gas_usd: Decimal::new(10, 2),
            bridge_fee_usd: Decimal::new(20, 2),
            failing_chains: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_fees(mut self, gas_usd: Decimal, bridge_fee_usd: Decimal) -> Self {
        self.gas_usd = gas_usd;
        self.bridge_fee_usd = bridge_fee_usd;
        self
    }

    pub fn failing_for(mut self, chain_id: u64) -> Self {
        self.failing_chains.push(chain_id);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for ScriptedQuotes {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_chains.contains(&request.to_chain) {
            bail!("no route to chain {}", request.to_chain);
        }
        Ok(Quote {
            route_id: format!("route-{}-{}", request.to_chain, request.to_address),
            estimated_gas_cost_usd: self.gas_usd,
            estimated_bridge_fee_usd: self.bridge_fee_usd,
            estimated_output: request.from_amount,
            slippage_bps: 0,
            execution_time_seconds: 60,
            request: request.clone(),
            transaction_request: None,
        })
    }
}

/// Transfer executor counting submissions
pub struct CountingTransfers {
    pub submissions: AtomicUsize,
    pub failing_recipients: Vec<String>,
    pub fail_all: bool,
    pub omit_hash: bool,
    pub delay: Duration,
}

impl CountingTransfers {
    pub fn new() -> Self {
        Self {
            submissions: AtomicUsize::new(0),
            failing_recipients: Vec::new(),
            fail_all: false,
            omit_hash: false,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_for(mut self, recipient: String) -> Self {
        self.failing_recipients.push(recipient);
        self
    }

    pub fn failing_always(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn without_hash(mut self) -> Self {
        self.omit_hash = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferExecutor for CountingTransfers {
    fn name(&self) -> &str {
        "counting"
    }

    async fn submit(&self, route: &Route, signer_address: &str) -> Result<TransferReceipt> {
        assert_eq!(signer_address, SIGNER);
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_all || self.failing_recipients.contains(&route.to_address) {
            bail!("insufficient funds");
        }
        Ok(TransferReceipt {
            tx_hash: if self.omit_hash { None } else { Some(format!("0xtx{:04}", n)) },
            destination_tx_hash: None,
        })
    }
}

/// Engine settings shared by every harness
pub fn test_config() -> ExecutionConfig {
    ExecutionConfig {
        signer_address: Some(SIGNER.to_string()),
        mock_delay: Duration::ZERO,
        ..Default::default()
    }
}

/// Settings under which any idle executing batch may be reopened at once
pub fn no_lease_config() -> ExecutionConfig {
    ExecutionConfig {
        stale_after: Duration::ZERO,
        ..test_config()
    }
}

pub struct Harness {
    pub store: Arc<dyn PayoutStore>,
    pub quotes: Arc<ScriptedQuotes>,
    pub transfers: Arc<CountingTransfers>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(MemoryStore::new()), ScriptedQuotes::new(), CountingTransfers::new())
    }

    pub fn with(quotes: ScriptedQuotes, transfers: CountingTransfers) -> Self {
        Self::build(Arc::new(MemoryStore::new()), quotes, transfers)
    }

    pub fn build(store: Arc<dyn PayoutStore>, quotes: ScriptedQuotes, transfers: CountingTransfers) -> Self {
        Self::build_with(store, quotes, transfers, test_config())
    }

    pub fn build_with(
        store: Arc<dyn PayoutStore>,
        quotes: ScriptedQuotes,
        transfers: CountingTransfers,
        config: ExecutionConfig,
    ) -> Self {
        let quotes = Arc::new(quotes);
        let transfers = Arc::new(transfers);
        let quote_provider: Arc<dyn QuoteProvider> = quotes.clone();
        let executor: Arc<dyn TransferExecutor> = transfers.clone();

        let orchestrator = Orchestrator::new(
            store.clone(),
            quote_provider,
            Some(executor),
            config,
            PriceTable::default(),
        );

        Self {
            store,
            quotes,
            transfers,
            orchestrator,
        }
    }

    /// Ingest rows as a draft batch
    pub async fn draft(&self, rows: &[PayoutRow]) -> Uuid {
        let (batch, _) = self
            .orchestrator
            .create_batch(PLATFORM, rows, Policy::default(), &base_usdc())
            .await
            .unwrap();
        batch.id
    }

    /// Ingest and plan
    pub async fn planned(&self, rows: &[PayoutRow]) -> Uuid {
        let id = self.draft(rows).await;
        self.orchestrator.plan(id).await.unwrap();
        id
    }

    /// Ingest, plan and quote
    pub async fn quoted(&self, rows: &[PayoutRow]) -> Uuid {
        let id = self.planned(rows).await;
        self.orchestrator.quote_all(id, Some(SIGNER)).await.unwrap();
        id
    }
}
