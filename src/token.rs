//! Manage json web tokens and their revocation watermark.

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::clock::Clock;
use crate::error::{Result, ServerError, ToInternal};

pub const TOKEN_TYPE: &str = "Bearer";

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub role: String,
    pub user_type: String,
    /// Identifies the time at which the JWT was issued.
    pub iat: i64,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: i64,
}

/// Which secret a token was signed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Freshly issued access and refresh tokens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime, in seconds.
    pub expires_in: i64,
}

#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Keys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// Issue, check and revoke JWT tokens.
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    access: Keys,
    refresh: Keys,
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a new [`TokenService`].
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            access: Keys::new(access_secret, access_ttl),
            refresh: Keys::new(refresh_secret, refresh_ttl),
            cache,
            clock,
        }
    }

    fn keys(&self, kind: TokenKind) -> &Keys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign(
        &self,
        kind: TokenKind,
        username: &str,
        role: &str,
        user_type: &str,
    ) -> Result<String> {
        let keys = self.keys(kind);
        let now = self.clock.timestamp();
        let claims = Claims {
            username: username.to_owned(),
            role: role.to_owned(),
            user_type: user_type.to_owned(),
            iat: now,
            exp: now + keys.ttl.num_seconds(),
        };

        encode(&Header::new(self.algorithm), &claims, &keys.encoding).catch()
    }

    /// Create a new access and refresh token pair.
    pub fn issue(
        &self,
        username: &str,
        role: &str,
        user_type: &str,
    ) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign(TokenKind::Access, username, role, user_type)?,
            refresh_token: self.sign(TokenKind::Refresh, username, role, user_type)?,
            expires_in: self.access.ttl.num_seconds(),
        })
    }

    /// Decode and check a token against the secret of `kind`.
    ///
    /// Every failure looks the same to the caller.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        // Expiry is checked against our own clock below.
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, ?kind, "token rejected");
                ServerError::unauthorized("Invalid token")
            })?;

        if claims.exp <= self.clock.timestamp() {
            tracing::debug!(?kind, exp = claims.exp, "token expired");
            return Err(ServerError::unauthorized("Invalid token"));
        }

        Ok(claims)
    }

    fn watermark_key(user_type: &str, username: &str) -> String {
        format!("{username}_{user_type}_last_reset_at")
    }

    /// Whether a token issued at `issued_at` is still valid regarding the
    /// last credential reset.
    ///
    /// A missing watermark, or a cache failure, counts as stale.
    pub async fn is_fresh(&self, user_type: &str, username: &str, issued_at: i64) -> bool {
        let key = Self::watermark_key(user_type, username);
        let watermark = match self.cache.get(&key).await {
            Ok(Some(value)) => value.parse::<i64>().ok(),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, %username, "cannot read revocation watermark");
                None
            },
        };

        matches!(watermark, Some(watermark) if watermark <= issued_at)
    }

    /// Move the revocation watermark up to `at`, making every token issued
    /// before it stale. A watermark already past `at` is kept.
    pub async fn bump_watermark(&self, user_type: &str, username: &str, at: i64) -> Result<()> {
        let key = Self::watermark_key(user_type, username);
        let kept = self.cache.raise(&key, at).await?;
        if kept > at {
            tracing::debug!(%username, watermark = kept, "newer watermark kept");
        }
        Ok(())
    }

    pub fn now(&self) -> i64 {
        self.clock.timestamp()
    }
}
