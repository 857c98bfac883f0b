use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::services::counters::{
    now_unix_ms, window_slot, CounterError, CounterSnapshot, CounterStore,
};

struct WindowCounter {
    window_start_ms: i64,
    used: u64,
}

/// Process-local counters for single-instance deployments and tests. Counters
/// reset whenever the process restarts; the hosted store is the durable one.
pub struct MemoryCounterStore {
    counters: DashMap<String, WindowCounter>,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(now_unix_ms))
    }

    pub fn with_clock(clock: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    fn snapshot(&self, key: &str, limit: u64, window: Duration, consume: bool) -> CounterSnapshot {
        let now_ms = (self.clock)();
        let (_, reset_at_ms) = window_slot(now_ms, window);
        let window_start_ms = reset_at_ms - window.as_millis() as i64;

        let mut entry = self.counters.entry(key.to_string()).or_insert(WindowCounter {
            window_start_ms,
            used: 0,
        });
        if entry.window_start_ms != window_start_ms {
            entry.window_start_ms = window_start_ms;
            entry.used = 0;
        }

        if consume {
            if entry.used >= limit {
                // At the limit the counter stays put, unlike the hosted
                // backend which increments first and denies after.
                return CounterSnapshot {
                    allowed: false,
                    used: entry.used,
                    remaining: 0,
                    limit,
                    reset_at_ms,
                };
            }
            entry.used += 1;
            return CounterSnapshot {
                allowed: true,
                used: entry.used,
                remaining: limit.saturating_sub(entry.used),
                limit,
                reset_at_ms,
            };
        }

        CounterSnapshot {
            allowed: entry.used < limit,
            used: entry.used,
            remaining: limit.saturating_sub(entry.used),
            limit,
            reset_at_ms,
        }
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn consume(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<CounterSnapshot, CounterError> {
        Ok(self.snapshot(key, limit, window, true))
    }

    async fn peek(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<CounterSnapshot, CounterError> {
        Ok(self.snapshot(key, limit, window, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn fixed_clock(start_ms: i64) -> (Arc<AtomicI64>, Arc<dyn Fn() -> i64 + Send + Sync>) {
        let now = Arc::new(AtomicI64::new(start_ms));
        let handle = now.clone();
        (now, Arc::new(move || handle.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn consumes_up_to_limit_then_denies() {
        let (_, clock) = fixed_clock(1_000);
        let store = MemoryCounterStore::with_clock(clock);
        let window = Duration::from_secs(60);

        for i in 1..=3 {
            let snap = store.consume("k", 3, window).await.unwrap();
            assert!(snap.allowed);
            assert_eq!(snap.used, i);
        }

        let denied = store.consume("k", 3, window).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.used, 3);
        assert_eq!(denied.remaining, 0);
    }

    #[tokio::test]
    async fn window_rollover_resets_the_counter() {
        let (now, clock) = fixed_clock(1_000);
        let store = MemoryCounterStore::with_clock(clock);
        let window = Duration::from_secs(60);

        for _ in 0..3 {
            store.consume("k", 3, window).await.unwrap();
        }
        assert!(!store.consume("k", 3, window).await.unwrap().allowed);

        now.store(61_000, Ordering::SeqCst);
        let snap = store.consume("k", 3, window).await.unwrap();
        assert!(snap.allowed);
        assert_eq!(snap.used, 1);
    }

    #[tokio::test]
    async fn peek_never_consumes() {
        let (_, clock) = fixed_clock(1_000);
        let store = MemoryCounterStore::with_clock(clock);
        let window = Duration::from_secs(60);

        store.consume("k", 5, window).await.unwrap();
        let a = store.peek("k", 5, window).await.unwrap();
        let b = store.peek("k", 5, window).await.unwrap();
        assert_eq!(a.used, 1);
        assert_eq!(b.used, 1);
        assert_eq!(a.remaining, 4);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (_, clock) = fixed_clock(1_000);
        let store = MemoryCounterStore::with_clock(clock);
        let window = Duration::from_secs(60);

        store.consume("a", 1, window).await.unwrap();
        let other = store.consume("b", 1, window).await.unwrap();
        assert!(other.allowed);
        assert_eq!(other.used, 1);
    }
}
