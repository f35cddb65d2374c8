//! Leases and usage quotas built on the shared cache.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::error::Result;

const LEASE_MARKER: &str = "1";

/// Mutual exclusion and rate limiting across every replica.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn Cache>,
}

impl RateLimiter {
    /// Create a new [`RateLimiter`].
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Try to take the lease on `key` for `ttl`.
    ///
    /// `false` means another caller holds it. That is not a failure; the
    /// client is expected to retry later. Never retries internally.
    pub async fn acquire_lease(&self, key: &str, ttl: Duration) -> Result<bool> {
        let granted = self.cache.set_if_absent(key, LEASE_MARKER, ttl).await?;
        if !granted {
            tracing::debug!(%key, "lease already held");
        }

        Ok(granted)
    }

    /// Count one use of `key` and tell whether it is still within quota.
    ///
    /// The counter is bumped atomically and its TTL is armed on the first
    /// use only. A call is denied when the uses before it already exceed
    /// `limit`, so `limit + 1` calls pass per window. Denied calls are not
    /// counted: the stored count stops at `limit + 1`.
    pub async fn check_and_consume_quota(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<bool> {
        let ceiling = i64::from(limit) + 1;
        let count = self.cache.increment(key, window, ceiling).await?;
        let allowed = count - 1 <= i64::from(limit);
        if !allowed {
            tracing::debug!(%key, count, limit, "quota exhausted");
        }

        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn test_lease_exclusivity() {
        let limiter = limiter();
        let ttl = Duration::from_secs(10);

        let (first, second) = tokio::join!(
            limiter.acquire_lease("01712345678_customer_signup_otp_gen", ttl),
            limiter.acquire_lease("01712345678_customer_signup_otp_gen", ttl),
        );
        assert!(first.unwrap() ^ second.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_released_after_ttl() {
        let limiter = limiter();
        let ttl = Duration::from_secs(5);

        assert!(limiter.acquire_lease("k", ttl).await.unwrap());
        assert!(!limiter.acquire_lease("k", ttl).await.unwrap());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.acquire_lease("k", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_quota_ceiling() {
        let limiter = limiter();
        let window = Duration::from_secs(300);
        let limit = 5;

        let mut accepted = 0;
        for _ in 0..limit + 1 {
            if limiter
                .check_and_consume_quota("q", limit, window)
                .await
                .unwrap()
            {
                accepted += 1;
            }
        }
        assert_eq!(accepted, limit + 1);

        // Call `limit + 2` and later are denied and not counted.
        for _ in 0..3 {
            assert!(
                !limiter
                    .check_and_consume_quota("q", limit, window)
                    .await
                    .unwrap()
            );
        }
        assert_eq!(
            limiter.cache.get("q").await.unwrap().as_deref(),
            Some("6")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_resets_after_window() {
        let limiter = limiter();
        let window = Duration::from_secs(60);

        for _ in 0..3 {
            limiter.check_and_consume_quota("q", 1, window).await.unwrap();
        }
        assert!(!limiter.check_and_consume_quota("q", 1, window).await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check_and_consume_quota("q", 1, window).await.unwrap());
    }
}
