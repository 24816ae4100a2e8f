//! Payout items, their lifecycle, and typed execution metadata.

use std::fmt;

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retry budget for a single item: `failed → executing` is refused at this count
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// One recipient/amount/route combination to be transferred
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutItem {
    /// Unique identifier for this item
    pub id: Uuid,

    /// Owning batch
    pub batch_id: Uuid,

    /// Position of the item in its batch (stored order)
    pub row_index: u32,

    /// Who gets paid and where
    pub recipient: Recipient,

    /// Where the funds come from
    pub source: Source,

    /// Current lifecycle status
    pub status: ItemStatus,

    /// Stable key derived from (platform, batch, row index)
    pub idempotency_key: String,

    /// Failed execution attempts so far
    pub retry_count: u32,

    /// Human-readable reason for the last failure
    pub failed_reason: Option<String>,

    /// Route, fee and transaction data accumulated across attempts
    #[serde(default)]
    pub execution: ExecutionMetadata,
}

impl PayoutItem {
    /// Create a new item at status `planned`
    pub fn new(
        batch_id: Uuid,
        row_index: u32,
        recipient: Recipient,
        source: Source,
        idempotency_key: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            row_index,
            recipient,
            source,
            status: ItemStatus::Planned,
            idempotency_key,
            retry_count: 0,
            failed_reason: None,
            execution: ExecutionMetadata::default(),
        }
    }

    /// Whether a batch execution pass should attempt this item
    pub fn is_eligible(&self, max_retries: u32) -> bool {
        match self.status {
            ItemStatus::Quoted => true,
            ItemStatus::Failed => self.retry_count < max_retries,
            _ => false,
        }
    }

    /// Transaction reference recorded for a completed transfer
    pub fn tx_hash(&self) -> Option<&str> {
        self.execution.bridge_tx_hash.as_deref()
    }

    /// Whether source and destination are the same chain
    pub fn is_same_chain(&self) -> bool {
        self.source.chain_id == self.recipient.chain_id
    }
}

/// Recipient descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    pub chain_id: u64,
    pub token: String,
}

/// Source descriptor; `amount` is in token base units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub chain_id: u64,
    pub token: String,
    #[serde(with = "decimal_u256")]
    pub amount: U256,
}

/// Lifecycle status of a payout item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Grouped, not yet quoted
    Planned,

    /// Quote obtained and policy-checked
    Quoted,

    /// Transfer in flight
    Executing,

    /// Transfer submitted and recorded
    Completed,

    /// Last attempt failed
    Failed,
}

impl ItemStatus {
    /// Whether `self → to` is a legal item transition.
    ///
    /// `quoted → quoted` refreshes a quote. `failed → executing` is the retry
    /// edge; the retry budget is checked separately by [`Self::validate_transition`].
    pub fn can_transition(self, to: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, to),
            (Planned, Quoted)
                | (Quoted, Quoted)
                | (Quoted, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Failed, Executing)
        )
    }

    /// Check a transition including the retry budget on the retry edge
    pub fn validate_transition(
        self,
        to: ItemStatus,
        retry_count: u32,
        max_retries: u32,
    ) -> Result<(), (ItemStatus, ItemStatus)> {
        if !self.can_transition(to) {
            return Err((self, to));
        }
        if self == ItemStatus::Failed && to == ItemStatus::Executing && retry_count >= max_retries {
            return Err((self, to));
        }
        Ok(())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Planned => "planned",
            ItemStatus::Quoted => "quoted",
            ItemStatus::Executing => "executing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planned" => Some(ItemStatus::Planned),
            "quoted" => Some(ItemStatus::Quoted),
            "executing" => Some(ItemStatus::Executing),
            "completed" => Some(ItemStatus::Completed),
            "failed" => Some(ItemStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planning decision for a routing group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionMode {
    /// Small payouts batched through a hub
    Hub,

    /// Payout sent individually
    Direct,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Hub => "HUB",
            ExecutionMode::Direct => "DIRECT",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quoted fee breakdown in USD
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFees {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_cost_usd: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_fee_usd: Option<Decimal>,
}

/// Execution metadata with field-level upsert semantics.
///
/// Every field is optional; [`ExecutionMetadata::merge`] only overwrites
/// fields the update actually sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExecutionMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_tx_hash: Option<String>,
    #[serde(default)]
    pub fees: ExecutionFees,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

impl ExecutionMetadata {
    /// Upsert every field set in `update`, keeping the rest
    pub fn merge(&mut self, update: ExecutionMetadata) {
        fn upsert<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        upsert(&mut self.mode, update.mode);
        upsert(&mut self.route_id, update.route_id);
        upsert(&mut self.quoted_at, update.quoted_at);
        upsert(&mut self.bridge_tx_hash, update.bridge_tx_hash);
        upsert(&mut self.destination_tx_hash, update.destination_tx_hash);
        upsert(&mut self.fees.gas_cost_usd, update.fees.gas_cost_usd);
        upsert(&mut self.fees.bridge_fee_usd, update.fees.bridge_fee_usd);
        upsert(&mut self.started_at, update.started_at);
        upsert(&mut self.executed_at, update.executed_at);
    }
}

/// Serialize token amounts as decimal strings rather than hex
pub mod decimal_u256 {
    use std::str::FromStr;

    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: ItemStatus, retry_count: u32) -> PayoutItem {
        let mut item = PayoutItem::new(
            Uuid::new_v4(),
            0,
            Recipient {
                address: "0x1111111111111111111111111111111111111111".to_string(),
                chain_id: 42161,
                token: "USDC".to_string(),
            },
            Source {
                chain_id: 8453,
                token: "USDC".to_string(),
                amount: U256::from(100_000_000u64),
            },
            "key".to_string(),
        );
        item.status = status;
        item.retry_count = retry_count;
        item
    }

    #[test]
    fn test_item_transitions() {
        assert!(ItemStatus::Planned.can_transition(ItemStatus::Quoted));
        assert!(ItemStatus::Quoted.can_transition(ItemStatus::Executing));
        assert!(ItemStatus::Executing.can_transition(ItemStatus::Completed));
        assert!(ItemStatus::Executing.can_transition(ItemStatus::Failed));
        assert!(ItemStatus::Failed.can_transition(ItemStatus::Executing));

        assert!(!ItemStatus::Planned.can_transition(ItemStatus::Executing));
        assert!(!ItemStatus::Completed.can_transition(ItemStatus::Executing));
        assert!(!ItemStatus::Completed.can_transition(ItemStatus::Failed));
        assert!(!ItemStatus::Failed.can_transition(ItemStatus::Quoted));
    }

    #[test]
    fn test_retry_edge_respects_budget() {
        assert!(ItemStatus::Failed
            .validate_transition(ItemStatus::Executing, 2, 3)
            .is_ok());
        assert_eq!(
            ItemStatus::Failed.validate_transition(ItemStatus::Executing, 3, 3),
            Err((ItemStatus::Failed, ItemStatus::Executing))
        );
    }

    #[test]
    fn test_eligibility() {
        assert!(item(ItemStatus::Quoted, 0).is_eligible(3));
        assert!(item(ItemStatus::Failed, 2).is_eligible(3));
        assert!(!item(ItemStatus::Failed, 3).is_eligible(3));
        assert!(!item(ItemStatus::Planned, 0).is_eligible(3));
        assert!(!item(ItemStatus::Completed, 0).is_eligible(3));
    }

    #[test]
    fn test_metadata_merge_keeps_existing_fields() {
        let mut meta = ExecutionMetadata {
            mode: Some(ExecutionMode::Hub),
            route_id: Some("route-1".to_string()),
            fees: ExecutionFees {
                gas_cost_usd: Some(Decimal::new(12, 2)),
                bridge_fee_usd: Some(Decimal::new(5, 1)),
            },
            ..Default::default()
        };

        meta.merge(ExecutionMetadata {
            bridge_tx_hash: Some("0xabc".to_string()),
            fees: ExecutionFees {
                gas_cost_usd: Some(Decimal::new(20, 2)),
                bridge_fee_usd: None,
            },
            ..Default::default()
        });

        assert_eq!(meta.mode, Some(ExecutionMode::Hub));
        assert_eq!(meta.route_id.as_deref(), Some("route-1"));
        assert_eq!(meta.bridge_tx_hash.as_deref(), Some("0xabc"));
        assert_eq!(meta.fees.gas_cost_usd, Some(Decimal::new(20, 2)));
        assert_eq!(meta.fees.bridge_fee_usd, Some(Decimal::new(5, 1)));
    }

    #[test]
    fn test_amount_serializes_as_decimal_string() {
        let item = item(ItemStatus::Planned, 0);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["source"]["amount"], "100000000");

        let parsed: PayoutItem = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.source.amount, U256::from(100_000_000u64));
    }
}
