use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Batch, BatchStatus, ItemStatus, PayoutItem};

use super::{check_batch_edge, check_item_edge, ItemGuard, PayoutStore, StoreError};

#[derive(Default)]
struct Tables {
    batches: HashMap<Uuid, Batch>,
    items: HashMap<Uuid, PayoutItem>,
}

/// A thread-safe in-memory store.
///
/// A single `RwLock` covers batches and items, so every compare-and-set is
/// atomic with respect to other writers. Clones share the same tables.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayoutStore for MemoryStore {
    async fn create_batch(&self, batch: &Batch, items: &[PayoutItem]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.batches.contains_key(&batch.id) {
            return Err(StoreError::AlreadyExists(batch.id));
        }
        if let Some(dup) = items.iter().find(|i| tables.items.contains_key(&i.id)) {
            return Err(StoreError::AlreadyExists(dup.id));
        }

        tables.batches.insert(batch.id, batch.clone());
        for item in items {
            tables.items.insert(item.id, item.clone());
        }
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.batches.get(&id).cloned())
    }

    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError> {
        let tables = self.tables.read().await;
        let mut batches: Vec<Batch> = tables.batches.values().cloned().collect();
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(batches)
    }

    async fn transition_batch(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
    ) -> Result<bool, StoreError> {
        check_batch_edge(from, to)?;
        let mut tables = self.tables.write().await;
        let batch = tables.batches.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if batch.status != from {
            return Ok(false);
        }
        batch.status = to;
        batch.updated_at = Utc::now();
        Ok(true)
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<PayoutItem>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.items.get(&id).cloned())
    }

    async fn list_items(&self, batch_id: Uuid) -> Result<Vec<PayoutItem>, StoreError> {
        let tables = self.tables.read().await;
        let mut items: Vec<PayoutItem> = tables
            .items
            .values()
            .filter(|i| i.batch_id == batch_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.row_index);
        Ok(items)
    }

    async fn find_completed_by_key(&self, key: &str) -> Result<Option<PayoutItem>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .items
            .values()
            .find(|i| i.idempotency_key == key && i.status == ItemStatus::Completed)
            .cloned())
    }

    async fn update_item(&self, item: &PayoutItem, guard: ItemGuard) -> Result<bool, StoreError> {
        check_item_edge(guard.status, item.status)?;
        let mut tables = self.tables.write().await;
        let slot = tables.items.get_mut(&item.id).ok_or(StoreError::NotFound(item.id))?;
        if ItemGuard::of(slot) != guard {
            return Ok(false);
        }
        slot.status = item.status;
        slot.retry_count = item.retry_count;
        slot.failed_reason = item.failed_reason.clone();
        slot.execution = item.execution.clone();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Policy, Recipient, Source};
    use alloy_primitives::U256;

    fn batch_with_items(count: u32) -> (Batch, Vec<PayoutItem>) {
        let batch = Batch::new("acme", Policy::default());
        let items = (0..count)
            .rev()
            .map(|row| {
                PayoutItem::new(
                    batch.id,
                    row,
                    Recipient {
                        address: "0x3333333333333333333333333333333333333333".to_string(),
                        chain_id: 10,
                        token: "USDC".to_string(),
                    },
                    Source {
                        chain_id: 8453,
                        token: "USDC".to_string(),
                        amount: U256::from(1u64),
                    },
                    format!("key-{}", row),
                )
            })
            .collect();
        (batch, items)
    }

    #[tokio::test]
    async fn test_create_and_list_in_row_order() {
        let store = MemoryStore::new();
        let (batch, items) = batch_with_items(3);
        store.create_batch(&batch, &items).await.unwrap();

        let listed = store.list_items(batch.id).await.unwrap();
        let rows: Vec<u32> = listed.iter().map(|i| i.row_index).collect();
        assert_eq!(rows, vec![0, 1, 2]);
        assert_eq!(store.get_batch(batch.id).await.unwrap().unwrap(), batch);
    }

    #[tokio::test]
    async fn test_duplicate_batch_rejected() {
        let store = MemoryStore::new();
        let (batch, items) = batch_with_items(1);
        store.create_batch(&batch, &items).await.unwrap();
        let result = store.create_batch(&batch, &[]).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_compare_and_set_item() {
        let store = MemoryStore::new();
        let (batch, items) = batch_with_items(1);
        store.create_batch(&batch, &items).await.unwrap();
        let read = items[0].clone();

        let mut quoted = read.clone();
        quoted.status = ItemStatus::Quoted;
        assert!(store.update_item(&quoted, ItemGuard::of(&read)).await.unwrap());
        // Second write from the stale read loses
        assert!(!store.update_item(&quoted, ItemGuard::of(&read)).await.unwrap());
        assert_eq!(
            store.get_item(read.id).await.unwrap().unwrap().status,
            ItemStatus::Quoted
        );
    }

    #[tokio::test]
    async fn test_update_is_fenced_on_retry_count() {
        let store = MemoryStore::new();
        let (batch, mut items) = batch_with_items(1);
        items[0].status = ItemStatus::Executing;
        store.create_batch(&batch, &items).await.unwrap();
        let claimed = items[0].clone();

        // Another attempt took over: failed, then claimed again
        let mut revoked = claimed.clone();
        revoked.status = ItemStatus::Failed;
        revoked.retry_count = 1;
        assert!(store.update_item(&revoked, ItemGuard::of(&claimed)).await.unwrap());
        let mut reclaimed = revoked.clone();
        reclaimed.status = ItemStatus::Executing;
        assert!(store.update_item(&reclaimed, ItemGuard::of(&revoked)).await.unwrap());

        let mut stale = claimed.clone();
        stale.status = ItemStatus::Completed;
        stale.execution.bridge_tx_hash = Some("0xstale".to_string());
        assert!(!store.update_item(&stale, ItemGuard::of(&claimed)).await.unwrap());

        let stored = store.get_item(claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Executing);
        assert_eq!(stored.retry_count, 1);
        assert!(stored.tx_hash().is_none());
    }

    #[tokio::test]
    async fn test_illegal_edges_are_refused() {
        let store = MemoryStore::new();
        let (mut batch, mut items) = batch_with_items(1);
        batch.status = BatchStatus::Completed;
        items[0].status = ItemStatus::Completed;
        store.create_batch(&batch, &items).await.unwrap();

        assert!(matches!(
            store
                .transition_batch(batch.id, BatchStatus::Completed, BatchStatus::Planned)
                .await,
            Err(StoreError::IllegalTransition { record: "batch", .. })
        ));

        let mut rerun = items[0].clone();
        rerun.status = ItemStatus::Executing;
        assert!(matches!(
            store.update_item(&rerun, ItemGuard::of(&items[0])).await,
            Err(StoreError::IllegalTransition { record: "item", .. })
        ));
        assert_eq!(
            store.get_item(items[0].id).await.unwrap().unwrap().status,
            ItemStatus::Completed
        );
        assert_eq!(
            store.get_batch(batch.id).await.unwrap().unwrap().status,
            BatchStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_find_completed_by_key() {
        let store = MemoryStore::new();
        let (batch, mut items) = batch_with_items(2);
        items[0].status = ItemStatus::Completed;
        store.create_batch(&batch, &items).await.unwrap();

        let found = store.find_completed_by_key(&items[0].idempotency_key).await.unwrap();
        assert_eq!(found.map(|i| i.id), Some(items[0].id));
        assert!(store
            .find_completed_by_key(&items[1].idempotency_key)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(store.get_batch(id).await.unwrap().is_none());
        assert!(matches!(
            store
                .transition_batch(id, BatchStatus::Draft, BatchStatus::Planned)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }
}
