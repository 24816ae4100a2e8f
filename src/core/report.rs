//! Batch status reports and exports.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Batch, ItemStatus, PayoutItem};

/// Item counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub planned: usize,
    pub quoted: usize,
    pub executing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn tally<'a>(items: impl IntoIterator<Item = &'a PayoutItem>) -> Self {
        let mut counts = Self::default();
        for item in items {
            match item.status {
                ItemStatus::Planned => counts.planned += 1,
                ItemStatus::Quoted => counts.quoted += 1,
                ItemStatus::Executing => counts.executing += 1,
                ItemStatus::Completed => counts.completed += 1,
                ItemStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.planned + self.quoted + self.executing + self.completed + self.failed
    }
}

/// A batch with its items and per-status counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch: Batch,
    pub counts: StatusCounts,
    pub items: Vec<PayoutItem>,
}

impl BatchReport {
    pub fn new(batch: Batch, items: Vec<PayoutItem>) -> Self {
        Self {
            counts: StatusCounts::tally(&items),
            batch,
            items,
        }
    }
}

/// Flat per-item record for exports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub item_id: Uuid,
    pub row_index: u32,
    pub recipient_address: String,
    pub destination_chain_id: u64,
    pub source_chain_id: u64,
    pub token: String,
    /// Base units
    pub amount: String,
    pub status: ItemStatus,
    pub mode: Option<String>,
    pub tx_hash: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub gas_cost_usd: Option<Decimal>,
    pub bridge_fee_usd: Option<Decimal>,
    pub retry_count: u32,
    pub failed_reason: Option<String>,
}

impl From<&PayoutItem> for ExportRow {
    fn from(item: &PayoutItem) -> Self {
        Self {
            item_id: item.id,
            row_index: item.row_index,
            recipient_address: item.recipient.address.clone(),
            destination_chain_id: item.recipient.chain_id,
            source_chain_id: item.source.chain_id,
            token: item.recipient.token.clone(),
            amount: item.source.amount.to_string(),
            status: item.status,
            mode: item.execution.mode.map(|m| m.as_str().to_string()),
            tx_hash: item.tx_hash().map(String::from),
            executed_at: item.execution.executed_at,
            gas_cost_usd: item.execution.fees.gas_cost_usd,
            bridge_fee_usd: item.execution.fees.bridge_fee_usd,
            retry_count: item.retry_count,
            failed_reason: item.failed_reason.clone(),
        }
    }
}

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Render items in the requested format
pub fn export_items(items: &[PayoutItem], format: ExportFormat) -> Result<String> {
    let rows: Vec<ExportRow> = items.iter().map(ExportRow::from).collect();
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(&rows).context("Failed to encode export as JSON"),
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for row in &rows {
                writer.serialize(row).context("Failed to encode export row")?;
            }
            let bytes = writer.into_inner().context("Failed to flush CSV export")?;
            String::from_utf8(bytes).context("CSV export is not UTF-8")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionMode, Recipient, Source};
    use alloy_primitives::U256;

    fn item(row: u32, status: ItemStatus) -> PayoutItem {
        let mut item = PayoutItem::new(
            Uuid::nil(),
            row,
            Recipient {
                address: format!("0x{:040x}", row + 1),
                chain_id: 137,
                token: "USDC".to_string(),
            },
            Source {
                chain_id: 8453,
                token: "USDC".to_string(),
                amount: U256::from(75_000_000u64),
            },
            format!("key-{}", row),
        );
        item.status = status;
        item
    }

    #[test]
    fn test_tally() {
        let items = vec![
            item(0, ItemStatus::Completed),
            item(1, ItemStatus::Completed),
            item(2, ItemStatus::Failed),
            item(3, ItemStatus::Quoted),
        ];
        let counts = StatusCounts::tally(&items);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.quoted, 1);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn test_csv_export() {
        let mut done = item(0, ItemStatus::Completed);
        done.execution.mode = Some(ExecutionMode::Hub);
        done.execution.bridge_tx_hash = Some("0xabc".to_string());

        let csv = export_items(&[done, item(1, ItemStatus::Planned)], ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("item_id,row_index,recipient_address"));
        assert!(lines[1].contains(",137,8453,USDC,75000000,completed,HUB,0xabc,,,,0,"));
        assert!(lines[2].contains(",planned,,,,,,0,"));
    }

    #[test]
    fn test_json_export() {
        let json = export_items(&[item(0, ItemStatus::Failed)], ExportFormat::Json).unwrap();
        let parsed: Vec<ExportRow> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].status, ItemStatus::Failed);
        assert_eq!(parsed[0].amount, "75000000");
    }
}
