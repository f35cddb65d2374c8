//! One-time codes per (principal, purpose).
//!
//! A challenge goes `NoChallenge -> Issued -> Verified | Expired |
//! ExhaustedAttempts`. Generation and matching are each serialized by a
//! lease and bounded by a quota, all held in the shared cache.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use rand::rngs::OsRng;

use crate::cache::Cache;
use crate::error::{Result, ServerError, ToInternal};
use crate::lease::RateLimiter;
use crate::principal::PrincipalKind;

pub const DEFAULT_OTP_LENGTH: usize = 5;

const MATCH_LEASE: Duration = Duration::from_secs(5);
const MATCH_LIMIT: u32 = 5;
const MATCH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Why a code was requested. Codes are never shared between purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    Signup,
    ForgotPassword,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Signup => "signup",
            Purpose::ForgotPassword => "forgot",
        }
    }

    /// Generation limits for this purpose.
    pub fn policy(&self) -> IssuePolicy {
        match self {
            Purpose::Signup => IssuePolicy {
                limit: 5,
                window: Duration::from_secs(24 * 60 * 60),
                lease: Duration::from_secs(10),
            },
            Purpose::ForgotPassword => IssuePolicy {
                limit: 2,
                window: Duration::from_secs(12 * 60 * 60),
                lease: Duration::from_secs(10),
            },
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a code may be generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IssuePolicy {
    pub limit: u32,
    pub window: Duration,
    pub lease: Duration,
}

/// Generate `length` decimal digits from the OS random source.
///
/// Bytes above the largest multiple of ten are dropped so every digit is
/// equally likely.
pub fn generate_digits(length: usize) -> Result<String> {
    const ZONE: u8 = 250;

    let mut digits = String::with_capacity(length);
    let mut buffer = [0u8; 16];
    while digits.len() < length {
        OsRng.try_fill_bytes(&mut buffer).catch()?;
        for byte in buffer.iter().filter(|b| **b < ZONE) {
            if digits.len() == length {
                break;
            }
            digits.push(char::from(b'0' + byte % 10));
        }
    }

    Ok(digits)
}

/// Issue and check one-time codes for one principal kind.
#[derive(Clone)]
pub struct OtpBroker {
    kind: PrincipalKind,
    limiter: RateLimiter,
    cache: Arc<dyn Cache>,
    length: usize,
}

impl OtpBroker {
    /// Create a new [`OtpBroker`].
    pub fn new(kind: PrincipalKind, cache: Arc<dyn Cache>, length: usize) -> Self {
        Self {
            kind,
            limiter: RateLimiter::new(Arc::clone(&cache)),
            cache,
            length,
        }
    }

    fn key(&self, username: &str, purpose: Purpose, suffix: &str) -> String {
        format!("{username}_{}_{purpose}_{suffix}", self.kind)
    }

    /// Generate a code for `username`. Storing and delivering it is up to
    /// the caller.
    pub async fn issue(&self, username: &str, purpose: Purpose) -> Result<String> {
        let policy = purpose.policy();

        let lease = self.key(username, purpose, "otp_gen");
        if !self.limiter.acquire_lease(&lease, policy.lease).await? {
            metrics::counter!("otp_denied_total", "purpose" => purpose.as_str(), "reason" => "lease")
                .increment(1);
            return Err(ServerError::too_many_requests(
                "Can not request multiple OTPs at once",
            ));
        }

        let quota = self.key(username, purpose, "otp_gen_limit");
        if !self
            .limiter
            .check_and_consume_quota(&quota, policy.limit, policy.window)
            .await?
        {
            metrics::counter!("otp_denied_total", "purpose" => purpose.as_str(), "reason" => "quota")
                .increment(1);
            let hours = policy.window.as_secs() / 3600;
            return Err(ServerError::too_many_requests(format!(
                "Please try again in {hours} hours"
            )));
        }

        let otp = generate_digits(self.length)?;
        metrics::counter!("otp_issued_total", "purpose" => purpose.as_str()).increment(1);
        tracing::debug!(%username, %purpose, kind = %self.kind, "otp issued");

        Ok(otp)
    }

    /// Keep `otp` as the live challenge for `(username, purpose)`.
    pub async fn store(
        &self,
        username: &str,
        purpose: Purpose,
        otp: &str,
        ttl: Duration,
    ) -> Result<()> {
        let key = self.key(username, purpose, "otp");
        self.cache.set(&key, otp, Some(ttl)).await
    }

    /// Serialize and count one match attempt.
    pub async fn guard_attempt(&self, username: &str, purpose: Purpose) -> Result<()> {
        let lease = self.key(username, purpose, "otp_match");
        if !self.limiter.acquire_lease(&lease, MATCH_LEASE).await? {
            return Err(ServerError::too_many_requests(
                "Please try again in a few seconds",
            ));
        }

        let quota = self.key(username, purpose, "otp_match_limit");
        if !self
            .limiter
            .check_and_consume_quota(&quota, MATCH_LIMIT, MATCH_WINDOW)
            .await?
        {
            metrics::counter!("otp_denied_total", "purpose" => purpose.as_str(), "reason" => "attempts")
                .increment(1);
            return Err(ServerError::too_many_requests("OTP verification failed"));
        }

        Ok(())
    }

    /// Match `candidate` against the stored challenge and consume it.
    pub async fn verify(&self, username: &str, purpose: Purpose, candidate: &str) -> Result<()> {
        self.guard_attempt(username, purpose).await?;

        let key = self.key(username, purpose, "otp");
        let Some(expected) = self.cache.get(&key).await? else {
            return Err(ServerError::validation("OTP expired"));
        };

        if expected != candidate {
            return Err(ServerError::validation("Incorrect OTP"));
        }

        self.cache.delete(&key).await
    }
}
