//! Mock transfer for dry runs.
//!
//! Produces a deterministic transaction id after a fixed delay, without any
//! network call.

use std::time::Duration;

use tracing::debug;

/// Synthetic transfer used in mock mode
#[derive(Debug, Clone)]
pub struct MockTransfer {
    delay: Duration,
}

impl MockTransfer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Synthetic transaction id for an idempotency key
    pub fn tx_hash_for(idempotency_key: &str) -> String {
        format!("0x{}", idempotency_key)
    }

    /// Wait out the artificial delay and return the synthetic transaction id
    pub async fn execute(&self, idempotency_key: &str) -> String {
        debug!(delay_ms = self.delay.as_millis() as u64, "Mock transfer");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Self::tx_hash_for(idempotency_key)
    }
}

impl Default for MockTransfer {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let mock = MockTransfer::new(Duration::ZERO);
        let first = mock.execute("abc123").await;
        let second = mock.execute("abc123").await;
        assert_eq!(first, "0xabc123");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_mock_waits_for_delay() {
        let mock = MockTransfer::new(Duration::from_millis(50));
        let started = std::time::Instant::now();
        mock.execute("k").await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
