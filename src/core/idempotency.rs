//! Idempotency key derivation.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Derive the idempotency key for a payout row.
///
/// SHA-256 over `"{platform_id}:{batch_id}:{row_index}"`, hex encoded
/// (64 lowercase characters). Pure: the same triple always yields the same key.
pub fn generate_key(platform_id: &str, batch_id: Uuid, row_index: u32) -> String {
    let input = format!("{}:{}:{}", platform_id, batch_id, row_index);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Keys for rows `0..count` of a batch
pub fn generate_batch_keys(platform_id: &str, batch_id: Uuid, count: u32) -> Vec<String> {
    (0..count)
        .map(|row| generate_key(platform_id, batch_id, row))
        .collect()
}
