//! Shared TTL key-value cache.
//!
//! The cache is the only synchronization point between concurrent requests
//! for the same principal: leases, quotas, challenges, pending
//! registrations and revocation watermarks all live here.
mod memory;
mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Port for cache primitives. Each call is atomic in isolation; nothing
/// else is relied upon.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` only if `key` is absent. Returns whether it was stored.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite `key`. Without `ttl` the key persists until overwritten.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Increment the counter at `key` and return the new count. `window`
    /// becomes the key TTL on the first increment only. A counter already at
    /// `ceiling` is left as is and `ceiling + 1` is returned.
    async fn increment(
        &self,
        key: &str,
        window: Duration,
        ceiling: i64,
    ) -> Result<i64>;

    /// Store `value` at `key` unless the stored number is already greater,
    /// without TTL. Returns the number kept.
    async fn raise(&self, key: &str, value: i64) -> Result<i64>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Whole seconds, never zero (a zero TTL is rejected by Redis).
fn seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
