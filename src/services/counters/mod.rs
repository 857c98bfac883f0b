pub mod hosted;
pub mod memory;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("counter backend returned status {0}")]
    Status(u16),
    #[error("could not decode counter response: {0}")]
    Decode(String),
}

/// Result of one counter operation against a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub allowed: bool,
    pub used: u64,
    pub remaining: u64,
    pub limit: u64,
    pub reset_at_ms: i64,
}

/// Fixed-window counter. Keys are already scoped to user and resource by the
/// caller; implementations add the window slot.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Consumes one unit. A denial must not advance the counter past the
    /// limit on backends that can avoid it.
    async fn consume(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<CounterSnapshot, CounterError>;

    /// Reads the current count without consuming.
    async fn peek(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<CounterSnapshot, CounterError>;
}

pub(crate) fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Maps a timestamp onto its window slot and the instant that window ends.
pub(crate) fn window_slot(now_ms: i64, window: Duration) -> (i64, i64) {
    let window_ms = window.as_millis() as i64;
    let slot = now_ms / window_ms;
    (slot, (slot + 1) * window_ms)
}
