//! SQLite-backed store.
//!
//! Batches and items live in two tables. Policy and execution metadata are
//! stored as JSON columns; amounts as decimal strings so no precision is
//! lost. Compare-and-set is a conditional `UPDATE ... WHERE status = ?`.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::domain::{Batch, BatchStatus, ItemStatus, PayoutItem, Recipient, Source};

use super::{check_batch_edge, check_item_edge, ItemGuard, PayoutStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS batches (
    id          TEXT PRIMARY KEY,
    platform_id TEXT NOT NULL,
    status      TEXT NOT NULL,
    policy      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS payout_items (
    id                TEXT PRIMARY KEY,
    batch_id          TEXT NOT NULL REFERENCES batches(id),
    row_index         INTEGER NOT NULL,
    recipient_address TEXT NOT NULL,
    dest_chain_id     INTEGER NOT NULL,
    preferred_token   TEXT NOT NULL,
    source_chain_id   INTEGER NOT NULL,
    source_token      TEXT NOT NULL,
    amount            TEXT NOT NULL,
    status            TEXT NOT NULL,
    idempotency_key   TEXT NOT NULL,
    retry_count       INTEGER NOT NULL DEFAULT 0,
    failed_reason     TEXT,
    execution         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_batch ON payout_items(batch_id, row_index);
CREATE INDEX IF NOT EXISTS idx_items_key ON payout_items(idempotency_key, status);
"#;

const ITEM_COLUMNS: &str = "id, batch_id, row_index, recipient_address, dest_chain_id, \
     preferred_token, source_chain_id, source_token, amount, status, idempotency_key, \
     retry_count, failed_reason, execution";

/// Durable store on a single SQLite database file
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    /// Private database, gone when the store is dropped
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Corrupt("connection lock poisoned".to_string()))
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("bad id '{}': {}", raw, e)))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

fn batch_from_row(row: &Row<'_>) -> Result<Batch, StoreError> {
    let id: String = row.get(0)?;
    let status: String = row.get(2)?;
    let policy: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(Batch {
        id: parse_uuid(&id)?,
        platform_id: row.get(1)?,
        status: BatchStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("bad batch status '{}'", status)))?,
        policy: serde_json::from_str(&policy)?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

fn item_from_row(row: &Row<'_>) -> Result<PayoutItem, StoreError> {
    let id: String = row.get(0)?;
    let batch_id: String = row.get(1)?;
    let amount: String = row.get(8)?;
    let status: String = row.get(9)?;
    let execution: String = row.get(13)?;

    Ok(PayoutItem {
        id: parse_uuid(&id)?,
        batch_id: parse_uuid(&batch_id)?,
        row_index: row.get(2)?,
        recipient: Recipient {
            address: row.get(3)?,
            chain_id: row.get::<_, i64>(4)? as u64,
            token: row.get(5)?,
        },
        source: Source {
            chain_id: row.get::<_, i64>(6)? as u64,
            token: row.get(7)?,
            amount: U256::from_str(&amount)
                .map_err(|e| StoreError::Corrupt(format!("bad amount '{}': {}", amount, e)))?,
        },
        status: ItemStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("bad item status '{}'", status)))?,
        idempotency_key: row.get(10)?,
        retry_count: row.get(11)?,
        failed_reason: row.get(12)?,
        execution: serde_json::from_str(&execution)?,
    })
}

fn collect_items(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<PayoutItem>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(item_from_row(row)?);
    }
    Ok(items)
}

#[async_trait]
impl PayoutStore for SqliteStore {
    async fn create_batch(&self, batch: &Batch, items: &[PayoutItem]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM batches WHERE id = ?1",
                params![batch.id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::AlreadyExists(batch.id));
        }

        tx.execute(
            "INSERT INTO batches (id, platform_id, status, policy, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                batch.id.to_string(),
                batch.platform_id,
                batch.status.as_str(),
                serde_json::to_string(&batch.policy)?,
                batch.created_at.to_rfc3339(),
                batch.updated_at.to_rfc3339(),
            ],
        )?;

        for item in items {
            tx.execute(
                &format!(
                    "INSERT INTO payout_items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    ITEM_COLUMNS
                ),
                params![
                    item.id.to_string(),
                    item.batch_id.to_string(),
                    item.row_index,
                    item.recipient.address,
                    item.recipient.chain_id as i64,
                    item.recipient.token,
                    item.source.chain_id as i64,
                    item.source.token,
                    item.source.amount.to_string(),
                    item.status.as_str(),
                    item.idempotency_key,
                    item.retry_count,
                    item.failed_reason,
                    serde_json::to_string(&item.execution)?,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, platform_id, status, policy, created_at, updated_at FROM batches WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(batch_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, platform_id, status, policy, created_at, updated_at
             FROM batches ORDER BY created_at DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut batches = Vec::new();
        while let Some(row) = rows.next()? {
            batches.push(batch_from_row(row)?);
        }
        Ok(batches)
    }

    async fn transition_batch(
        &self,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
    ) -> Result<bool, StoreError> {
        check_batch_edge(from, to)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE batches SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![to.as_str(), Utc::now().to_rfc3339(), id.to_string(), from.as_str()],
        )?;
        if changed == 0 {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM batches WHERE id = ?1",
                    params![id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(id));
            }
        }
        Ok(changed == 1)
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<PayoutItem>, StoreError> {
        let conn = self.conn()?;
        let items = collect_items(
            &conn,
            &format!("SELECT {} FROM payout_items WHERE id = ?1", ITEM_COLUMNS),
            params![id.to_string()],
        )?;
        Ok(items.into_iter().next())
    }

    async fn list_items(&self, batch_id: Uuid) -> Result<Vec<PayoutItem>, StoreError> {
        let conn = self.conn()?;
        collect_items(
            &conn,
            &format!(
                "SELECT {} FROM payout_items WHERE batch_id = ?1 ORDER BY row_index",
                ITEM_COLUMNS
            ),
            params![batch_id.to_string()],
        )
    }

    async fn find_completed_by_key(&self, key: &str) -> Result<Option<PayoutItem>, StoreError> {
        let conn = self.conn()?;
        let items = collect_items(
            &conn,
            &format!(
                "SELECT {} FROM payout_items WHERE idempotency_key = ?1 AND status = 'completed' LIMIT 1",
                ITEM_COLUMNS
            ),
            params![key],
        )?;
        Ok(items.into_iter().next())
    }

    async fn update_item(&self, item: &PayoutItem, guard: ItemGuard) -> Result<bool, StoreError> {
        check_item_edge(guard.status, item.status)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE payout_items
             SET status = ?1, retry_count = ?2, failed_reason = ?3, execution = ?4
             WHERE id = ?5 AND status = ?6 AND retry_count = ?7",
            params![
                item.status.as_str(),
                item.retry_count,
                item.failed_reason,
                serde_json::to_string(&item.execution)?,
                item.id.to_string(),
                guard.status.as_str(),
                guard.retry_count,
            ],
        )?;
        if changed == 0 {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM payout_items WHERE id = ?1",
                    params![item.id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(item.id));
            }
        }
        Ok(changed == 1)
    }
}
