//! Token-bucket rate limiting.
//!
//! One bucket family per upstream provider plus the notification buckets
//! (global, per-chat, per-group). Buckets refill by whole elapsed intervals
//! so tokens never exceed capacity and waiting callers cannot deadlock: the
//! refill is purely time based.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A single token bucket.
pub struct TokenBucket {
    capacity: f64,
    refill_amount: f64,
    interval: Duration,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_amount: u32, interval: Duration) -> Self {
        let capacity = capacity.max(1) as f64;
        Self {
            capacity,
            refill_amount: refill_amount.max(1) as f64,
            interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Suspend until `amount` tokens are available, then debit them.
    pub async fn acquire(&self, amount: f64) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed();
                if elapsed >= self.interval && !self.interval.is_zero() {
                    // Whole-interval refills keep the bucket stable under load
                    let intervals = (elapsed.as_secs_f64() / self.interval.as_secs_f64()) as u32;
                    if intervals > 0 {
                        state.tokens = (state.tokens + intervals as f64 * self.refill_amount)
                            .min(self.capacity);
                        state.last_refill = Instant::now();
                    }
                }
                if state.tokens >= amount {
                    state.tokens -= amount;
                    return;
                }
                let needed = amount - state.tokens;
                let rate_per_sec = if self.interval.is_zero() {
                    self.refill_amount
                } else {
                    self.refill_amount / self.interval.as_secs_f64()
                };
                (needed / rate_per_sec.max(1e-6)).max(0.01)
            };
            // jitter avoids a thundering herd of waiters waking together
            let jitter = rand::thread_rng().gen_range(0.0..0.05);
            tokio::time::sleep(Duration::from_secs_f64(wait.min(2.0) + jitter)).await;
        }
    }

    /// Debit without waiting; returns false when tokens are unavailable.
    pub async fn try_acquire(&self, amount: f64) -> bool {
        let mut state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed();
        if elapsed >= self.interval && !self.interval.is_zero() {
            let intervals = (elapsed.as_secs_f64() / self.interval.as_secs_f64()) as u32;
            if intervals > 0 {
                state.tokens =
                    (state.tokens + intervals as f64 * self.refill_amount).min(self.capacity);
                state.last_refill = Instant::now();
            }
        }
        if state.tokens >= amount {
            state.tokens -= amount;
            true
        } else {
            false
        }
    }

    /// Current token count (tests and diagnostics)
    pub async fn available(&self) -> f64 {
        self.state.lock().await.tokens
    }
}

/// Static limit table entry
#[derive(Debug, Clone, Copy)]
struct Limit {
    capacity: u32,
    refill: u32,
    interval_secs: f64,
}

/// Per-key registry of token buckets, lazily created from the limit table.
pub struct RateLimits {
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
    limits: HashMap<&'static str, Limit>,
    default_limit: Limit,
}

impl RateLimits {
    pub fn new() -> Self {
        let mut limits = HashMap::new();
        limits.insert(
            "birdeye",
            Limit {
                capacity: 1,
                refill: 1,
                interval_secs: 1.0,
            },
        );
        limits.insert(
            "dexscreener",
            Limit {
                capacity: 300,
                refill: 300,
                interval_secs: 60.0,
            },
        );
        limits.insert(
            "gecko",
            Limit {
                capacity: 30,
                refill: 30,
                interval_secs: 60.0,
            },
        );
        limits.insert(
            "helius",
            Limit {
                capacity: 100,
                refill: 100,
                interval_secs: 1.0,
            },
        );
        limits.insert(
            "jupiter",
            Limit {
                capacity: 100,
                refill: 100,
                interval_secs: 1.0,
            },
        );
        limits.insert(
            "discovery",
            Limit {
                capacity: 8,
                refill: 8,
                interval_secs: 1.0,
            },
        );
        limits.insert(
            "telegram_global",
            Limit {
                capacity: 30,
                refill: 30,
                interval_secs: 1.0,
            },
        );
        Self {
            buckets: Mutex::new(HashMap::new()),
            limits,
            default_limit: Limit {
                capacity: 10,
                refill: 10,
                interval_secs: 1.0,
            },
        }
    }

    async fn bucket_with_limit(&self, key: &str, limit: Limit) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(TokenBucket::new(
                    limit.capacity,
                    limit.refill,
                    Duration::from_secs_f64(limit.interval_secs),
                ))
            })
            .clone()
    }

    /// Bucket for a named provider/key (lazily created, process lifetime)
    pub async fn bucket(&self, key: &str) -> Arc<TokenBucket> {
        let limit = self
            .limits
            .get(key)
            .copied()
            .unwrap_or(self.default_limit);
        self.bucket_with_limit(key, limit).await
    }

    /// Shorthand: wait for one token on the named bucket
    pub async fn acquire(&self, key: &str) {
        self.bucket(key).await.acquire(1.0).await;
    }

    /// Per-chat notification bucket (1 msg/sec per chat)
    pub async fn chat_bucket(&self, chat_id: i64) -> Arc<TokenBucket> {
        self.bucket_with_limit(
            &format!("telegram_chat_{}", chat_id),
            Limit {
                capacity: 1,
                refill: 1,
                interval_secs: 1.0,
            },
        )
        .await
    }

    /// Per-group notification bucket (20 msgs/min, Telegram group ceiling)
    pub async fn group_bucket(&self, chat_id: i64) -> Arc<TokenBucket> {
        self.bucket_with_limit(
            &format!("telegram_group_{}", chat_id),
            Limit {
                capacity: 20,
                refill: 20,
                interval_secs: 60.0,
            },
        )
        .await
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokens_never_exceed_capacity() {
        let bucket = TokenBucket::new(5, 5, Duration::from_millis(10));
        // Let several refill intervals elapse on a full bucket
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(bucket.try_acquire(5.0).await);
        assert!(!bucket.try_acquire(1.0).await);
    }

    #[tokio::test]
    async fn test_acquire_bounded_within_interval() {
        // Capacity 3, refill 3 per 100ms: a full bucket plus at most one
        // refill can be drained inside a single interval.
        let bucket = TokenBucket::new(3, 3, Duration::from_millis(100));
        let start = Instant::now();
        for _ in 0..3 {
            bucket.acquire(1.0).await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
        // Fourth acquire must wait for a refill
        bucket.acquire(1.0).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_refill_after_interval() {
        let bucket = TokenBucket::new(2, 2, Duration::from_millis(20));
        assert!(bucket.try_acquire(2.0).await);
        assert!(!bucket.try_acquire(1.0).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(bucket.try_acquire(2.0).await);
    }

    #[tokio::test]
    async fn test_registry_reuses_buckets() {
        let limits = RateLimits::new();
        let a = limits.bucket("dexscreener").await;
        let b = limits.bucket("dexscreener").await;
        assert!(Arc::ptr_eq(&a, &b));
        // Unknown keys fall back to the generic limit
        let generic = limits.bucket("something-else").await;
        assert!(generic.try_acquire(10.0).await);
        assert!(!generic.try_acquire(1.0).await);
    }
}
