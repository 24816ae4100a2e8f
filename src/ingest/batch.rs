//! Turn parsed payout rows into a stored draft batch.

use thiserror::Error;
use tracing::info;

use crate::core::idempotency::generate_key;
use crate::domain::{Batch, PayoutItem, Policy, Recipient, Source};
use crate::store::{PayoutStore, StoreError};

use super::parser::PayoutRow;

/// Errors that can occur while creating a batch
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No payout rows to ingest")]
    Empty,

    #[error("Too many payout rows: {0}")]
    TooManyRows(usize),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Where every payout in a new batch is funded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDefaults {
    pub chain_id: u64,
    pub token: String,
}

/// Create a draft batch with one `planned` item per row
pub async fn create_batch(
    store: &dyn PayoutStore,
    platform_id: &str,
    rows: &[PayoutRow],
    policy: Policy,
    source: &SourceDefaults,
) -> Result<(Batch, Vec<PayoutItem>), IngestError> {
    if rows.is_empty() {
        return Err(IngestError::Empty);
    }
    if u32::try_from(rows.len()).is_err() {
        return Err(IngestError::TooManyRows(rows.len()));
    }

    let batch = Batch::new(platform_id, policy);

    let items: Vec<PayoutItem> = rows
        .iter()
        .zip(0u32..)
        .map(|(row, index)| {
            PayoutItem::new(
                batch.id,
                index,
                Recipient {
                    address: row.recipient_address.clone(),
                    chain_id: row.destination_chain_id,
                    token: row.preferred_token.clone(),
                },
                Source {
                    chain_id: source.chain_id,
                    token: source.token.clone(),
                    amount: row.amount,
                },
                generate_key(platform_id, batch.id, index),
            )
        })
        .collect();

    store.create_batch(&batch, &items).await?;

    info!(batch_id = %batch.id, platform_id, items = items.len(), "Batch created");

    Ok((batch, items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BatchStatus, ItemStatus};
    use crate::store::MemoryStore;
    use alloy_primitives::U256;

    fn row(amount: u64) -> PayoutRow {
        PayoutRow {
            recipient_address: "0x3333333333333333333333333333333333333333".to_string(),
            destination_chain_id: 42161,
            preferred_token: "USDC".to_string(),
            amount: U256::from(amount),
        }
    }

    fn base_usdc() -> SourceDefaults {
        SourceDefaults {
            chain_id: 8453,
            token: "USDC".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_batch() {
        let store = MemoryStore::new();
        let (batch, items) = create_batch(&store, "acme", &[row(1), row(2)], Policy::default(), &base_usdc())
            .await
            .unwrap();

        assert_eq!(batch.status, BatchStatus::Draft);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.status == ItemStatus::Planned));
        assert_eq!(items[1].row_index, 1);
        assert_eq!(items[1].idempotency_key, generate_key("acme", batch.id, 1));
        assert_eq!(items[0].source.chain_id, 8453);

        let stored = store.list_items(batch.id).await.unwrap();
        assert_eq!(stored, items);
    }

    #[tokio::test]
    async fn test_empty_rows_rejected() {
        let store = MemoryStore::new();
        let err = create_batch(&store, "acme", &[], Policy::default(), &base_usdc())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Empty));
        assert!(store.list_batches().await.unwrap().is_empty());
    }
}
