//! In-process cache.
//!
//! Only safe for a single replica: leases and quotas are not shared with
//! other processes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::Cache;
use crate::error::{Result, ToInternal};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory implementation of [`Cache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }

        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().await.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        window: Duration,
        ceiling: i64,
    ) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let count = match entries.get(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => entry.value.parse::<i64>().catch()? + 1,
            None => 1,
        };
        if count > ceiling {
            return Ok(ceiling + 1);
        }
        let expires_at = match entries.get(key) {
            Some(entry) if count > 1 => entry.expires_at,
            _ => Some(now + window),
        };

        entries.insert(
            key.to_owned(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn raise(&self, key: &str, value: i64) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let current = match entries.get(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => Some(entry.value.parse::<i64>().catch()?),
            None => None,
        };
        if let Some(current) = current.filter(|current| *current >= value) {
            return Ok(current);
        }

        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
