//! Redis-backed cache.

use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;

use super::{Cache, seconds};
use crate::deadline::bounded;
use crate::error::Result;

/// Count one use, arming the TTL only when none is set. The counter never
/// goes past `ARGV[2]`.
const INCREMENT: &str = r"
local count = tonumber(redis.call('GET', KEYS[1]) or '0')
local ceiling = tonumber(ARGV[2])
if count >= ceiling then
    return ceiling + 1
end
count = redis.call('INCR', KEYS[1])
if redis.call('TTL', KEYS[1]) < 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Keep the greatest of the stored number and `ARGV[1]`.
const RAISE: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]))
local value = tonumber(ARGV[1])
if current ~= nil and current >= value then
    return current
end
redis.call('SET', KEYS[1], ARGV[1])
return value
";

/// Cache shared by every replica. Cloning shares the multiplexed connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect and keep a self-reconnecting multiplexed connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = bounded(ConnectionManager::new(client)).await?;

        tracing::info!("redis connected");

        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = bounded(
            ::redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(seconds(ttl))
                .query_async(&mut conn),
        )
        .await?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = bounded(conn.get(key)).await?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(seconds(ttl));
        }

        let _: () = bounded(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        window: Duration,
        ceiling: i64,
    ) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = bounded(
            ::redis::Script::new(INCREMENT)
                .key(key)
                .arg(seconds(window))
                .arg(ceiling)
                .invoke_async(&mut conn),
        )
        .await?;

        Ok(count)
    }

    async fn raise(&self, key: &str, value: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let kept: i64 = bounded(
            ::redis::Script::new(RAISE)
                .key(key)
                .arg(value)
                .invoke_async(&mut conn),
        )
        .await?;

        Ok(kept)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = bounded(conn.del(key)).await?;
        Ok(())
    }
}
