//! Unverified signups waiting for their OTP.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::error::{Result, ServerError, ToInternal};
use crate::principal::PrincipalKind;

/// Signup payload held until the phone number is proven.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub username: String,
    pub full_name: String,
    /// Argon2id PHC string. Plaintext never reaches the cache.
    pub password_hash: String,
    pub kind: PrincipalKind,
}

impl PendingRegistration {
    fn is_empty(&self) -> bool {
        self.username.is_empty() && self.full_name.is_empty() && self.password_hash.is_empty()
    }
}

/// Cache-backed store of [`PendingRegistration`], keyed by
/// `(kind, username, otp)`.
#[derive(Clone)]
pub struct PendingRegistrationStore {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl PendingRegistrationStore {
    /// Create a new [`PendingRegistrationStore`].
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(kind: PrincipalKind, username: &str, otp: &str) -> String {
        format!("{kind}_{username}_{otp}")
    }

    pub async fn hold(&self, otp: &str, payload: &PendingRegistration) -> Result<()> {
        if payload.is_empty() {
            return Err(ServerError::validation("Nothing to create"));
        }

        let key = Self::key(payload.kind, &payload.username, otp);
        let value = serde_json::to_string(payload).catch()?;
        self.cache.set(&key, &value, Some(self.ttl)).await
    }

    /// Read a held payload back. A miss means the code is wrong or gone.
    pub async fn retrieve(
        &self,
        kind: PrincipalKind,
        username: &str,
        otp: &str,
    ) -> Result<PendingRegistration> {
        let key = Self::key(kind, username, otp);
        let Some(value) = self.cache.get(&key).await? else {
            return Err(ServerError::validation("OTP expired"));
        };

        let payload: PendingRegistration = serde_json::from_str(&value).catch()?;
        if payload.kind != kind || payload.username != username {
            tracing::warn!(%username, %kind, "pending registration does not match its key");
            return Err(ServerError::validation("OTP expired"));
        }

        Ok(payload)
    }

    pub async fn discard(&self, kind: PrincipalKind, username: &str, otp: &str) -> Result<()> {
        self.cache.delete(&Self::key(kind, username, otp)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn payload(kind: PrincipalKind) -> PendingRegistration {
        PendingRegistration {
            username: "01712345678".into(),
            full_name: "Rahim Uddin".into(),
            password_hash: "$argon2id$v=19$placeholder".into(),
            kind,
        }
    }

    fn store(cache: Arc<dyn Cache>) -> PendingRegistrationStore {
        PendingRegistrationStore::new(cache, Duration::from_secs(6 * 60))
    }

    #[tokio::test]
    async fn test_hold_and_retrieve() {
        let store = store(Arc::new(MemoryCache::new()));
        store.hold("12345", &payload(PrincipalKind::Customer)).await.unwrap();

        let found = store
            .retrieve(PrincipalKind::Customer, "01712345678", "12345")
            .await
            .unwrap();
        assert_eq!(found, payload(PrincipalKind::Customer));
    }

    #[tokio::test]
    async fn test_empty_payload_is_rejected() {
        let store = store(Arc::new(MemoryCache::new()));
        let err = store
            .hold("12345", &PendingRegistration::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Nothing to create");
    }

    #[tokio::test]
    async fn test_wrong_code_or_kind_is_a_miss() {
        let store = store(Arc::new(MemoryCache::new()));
        store.hold("12345", &payload(PrincipalKind::Merchant)).await.unwrap();

        let err = store
            .retrieve(PrincipalKind::Merchant, "01712345678", "54321")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OTP expired");

        let err = store
            .retrieve(PrincipalKind::Customer, "01712345678", "12345")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OTP expired");
    }

    #[tokio::test]
    async fn test_discard_consumes() {
        let store = store(Arc::new(MemoryCache::new()));
        store.hold("12345", &payload(PrincipalKind::Customer)).await.unwrap();
        store
            .discard(PrincipalKind::Customer, "01712345678", "12345")
            .await
            .unwrap();

        assert!(store
            .retrieve(PrincipalKind::Customer, "01712345678", "12345")
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_expires() {
        let store = store(Arc::new(MemoryCache::new()));
        store.hold("12345", &payload(PrincipalKind::Customer)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6 * 60 + 1)).await;
        let err = store
            .retrieve(PrincipalKind::Customer, "01712345678", "12345")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OTP expired");
    }
}
