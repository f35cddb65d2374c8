//! Account flows for one principal kind.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::NaiveDate;
use regex_lite::Regex;

use super::{AccountRepository, Principal, PrincipalKind, PrincipalPatch, ShortProfile, Status};
use crate::cache::Cache;
use crate::clock::Clock;
use crate::config::Otp as OtpConfig;
use crate::crypto::{PasswordManager, check_password_policy};
use crate::error::{Result, ServerError, ToInternal};
use crate::lease::RateLimiter;
use crate::notify::OtpSender;
use crate::otp::{OtpBroker, Purpose};
use crate::pending::{PendingRegistration, PendingRegistrationStore};
use crate::token::{Claims, TokenKind, TokenPair, TokenService};

const PASSWORD_LEASE: Duration = Duration::from_secs(5);
const PASSWORD_LIMIT: u32 = 5;
const PASSWORD_WINDOW: Duration = Duration::from_secs(5 * 60);

const GENDERS: [&str; 3] = ["male", "female", "other"];

static PHONE_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^01[3-9][0-9]{8}$").ok());

/// Check a Bangladeshi mobile number such as `01712345678`.
pub fn check_phone_number(username: &str) -> Result<()> {
    match PHONE_NUMBER.as_ref() {
        Some(re) if re.is_match(username) => Ok(()),
        _ => Err(ServerError::validation("Phone number is not valid")),
    }
}

/// Collaborators shared by every [`PrincipalService`].
#[derive(Clone)]
pub struct Dependencies {
    pub cache: Arc<dyn Cache>,
    pub tokens: TokenService,
    pub passwords: PasswordManager,
    pub sender: Arc<dyn OtpSender>,
    pub clock: Arc<dyn Clock>,
    pub otp: OtpConfig,
}

/// Profile fields a principal may change. Blank values are ignored.
#[derive(Clone, Debug, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub occupation: Option<String>,
    pub organization: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_pic_url: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

impl ProfileUpdate {
    fn into_patch(self) -> Result<PrincipalPatch> {
        let gender = trimmed(&self.gender).map(|g| g.to_lowercase());
        if let Some(gender) = &gender {
            if !GENDERS.contains(&gender.as_str()) {
                return Err(ServerError::validation("Invalid gender"));
            }
        }

        Ok(PrincipalPatch {
            full_name: trimmed(&self.full_name),
            gender,
            email: trimmed(&self.email).map(|e| e.to_lowercase()),
            occupation: trimmed(&self.occupation),
            organization: trimmed(&self.organization),
            birth_date: self.birth_date,
            profile_pic_url: trimmed(&self.profile_pic_url),
            ..Default::default()
        })
    }
}

/// Signup, login, reset and profile flows bound to one table.
#[derive(Clone)]
pub struct PrincipalService {
    kind: PrincipalKind,
    repository: Arc<dyn AccountRepository>,
    otp: OtpBroker,
    pending: PendingRegistrationStore,
    limiter: RateLimiter,
    tokens: TokenService,
    passwords: PasswordManager,
    sender: Arc<dyn OtpSender>,
    clock: Arc<dyn Clock>,
    forgot_ttl: Duration,
}

impl PrincipalService {
    /// Create a new [`PrincipalService`].
    pub fn new(
        kind: PrincipalKind,
        repository: Arc<dyn AccountRepository>,
        deps: &Dependencies,
    ) -> Self {
        Self {
            kind,
            repository,
            otp: OtpBroker::new(kind, Arc::clone(&deps.cache), deps.otp.length),
            pending: PendingRegistrationStore::new(
                Arc::clone(&deps.cache),
                deps.otp.pending_ttl(),
            ),
            limiter: RateLimiter::new(Arc::clone(&deps.cache)),
            tokens: deps.tokens.clone(),
            passwords: deps.passwords.clone(),
            sender: Arc::clone(&deps.sender),
            clock: Arc::clone(&deps.clock),
            forgot_ttl: deps.otp.forgot_ttl(),
        }
    }

    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    async fn find(&self, username: &str) -> Result<Principal> {
        let principal = self
            .repository
            .find(username)
            .await
            .map_err(|err| err.not_found_as("User not found"))?;

        if principal.is_deleted {
            return Err(ServerError::validation("User not found"));
        }
        Ok(principal)
    }

    /// Serialize and count password checks for `action`.
    async fn guard_password(&self, username: &str, action: &str) -> Result<()> {
        let lease = format!("{username}_{}_{action}_password_match", self.kind);
        if !self.limiter.acquire_lease(&lease, PASSWORD_LEASE).await? {
            return Err(ServerError::too_many_requests(
                "Please try again in a few seconds",
            ));
        }

        let quota = format!("{lease}_limit");
        if !self
            .limiter
            .check_and_consume_quota(&quota, PASSWORD_LIMIT, PASSWORD_WINDOW)
            .await?
        {
            return Err(ServerError::too_many_requests("Please try again later"));
        }

        Ok(())
    }

    async fn deliver(&self, username: &str, otp: &str) {
        if let Err(err) = self.sender.send(self.kind, username, otp).await {
            tracing::error!(error = %err, kind = %self.kind, %username, "otp delivery failed");
        }
    }

    /// Start a signup. The record is only created once the returned code
    /// comes back through [`PrincipalService::verify_signup`].
    pub async fn signup(
        &self,
        username: &str,
        full_name: &str,
        password: &str,
    ) -> Result<String> {
        check_password_policy(password)?;
        check_phone_number(username)?;

        match self.repository.find(username).await {
            Ok(_) => return Err(ServerError::validation("User already exists")),
            Err(ServerError::NotFound) => {},
            Err(err) => return Err(err),
        }

        let otp = self.otp.issue(username, Purpose::Signup).await?;
        let password_hash = self.passwords.hash_password(password).catch()?;

        self.pending
            .hold(
                &otp,
                &PendingRegistration {
                    username: username.to_owned(),
                    full_name: full_name.trim().to_owned(),
                    password_hash,
                    kind: self.kind,
                },
            )
            .await?;
        self.deliver(username, &otp).await;

        Ok(otp)
    }

    /// Promote a pending registration into a durable, active record.
    pub async fn verify_signup(&self, username: &str, otp: &str) -> Result<()> {
        check_phone_number(username)?;
        self.otp.guard_attempt(username, Purpose::Signup).await?;

        let pending = self.pending.retrieve(self.kind, username, otp).await?;

        let now = self.clock.now();
        let principal = Principal {
            username: pending.username,
            full_name: pending.full_name,
            password: pending.password_hash,
            status: Status::Active,
            is_verified: true,
            is_deleted: false,
            last_reset_at: now,
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        self.repository.insert(&principal).await?;

        self.pending.discard(self.kind, username, otp).await?;
        tracing::info!(kind = %self.kind, %username, "account created");

        Ok(())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        const INCORRECT: &str = "Incorrect username or password";

        self.guard_password(username, "login").await?;

        let principal = match self.repository.find(username).await {
            Ok(principal) if !principal.is_deleted => principal,
            Ok(_) | Err(ServerError::NotFound) => {
                return Err(ServerError::validation(INCORRECT));
            },
            Err(err) => return Err(err),
        };

        if !self.passwords.verify_password(password, &principal.password) {
            tracing::debug!(kind = %self.kind, %username, "password mismatch");
            return Err(ServerError::validation(INCORRECT));
        }

        self.tokens
            .bump_watermark(
                self.kind.as_str(),
                username,
                principal.last_reset_at.timestamp(),
            )
            .await?;

        self.tokens.issue(username, "", self.kind.as_str())
    }

    fn check_user_type(&self, claims: &Claims) -> Result<()> {
        if claims.user_type != self.kind.as_str() {
            return Err(ServerError::unauthorized(format!(
                "Restricted to {}s",
                self.kind
            )));
        }
        Ok(())
    }

    /// Trade a refresh token for a new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        self.check_user_type(&claims)?;

        let principal = match self.repository.find(&claims.username).await {
            Ok(principal) if !principal.is_deleted => principal,
            Ok(_) | Err(ServerError::NotFound) => {
                return Err(ServerError::unauthorized("Invalid token"));
            },
            Err(err) => return Err(err),
        };

        let last_reset_at = principal.last_reset_at.timestamp();
        if last_reset_at > claims.iat {
            return Err(ServerError::unauthorized("Session expired"));
        }

        self.tokens
            .bump_watermark(self.kind.as_str(), &claims.username, last_reset_at)
            .await?;
        self.tokens.issue(&claims.username, &claims.role, self.kind.as_str())
    }

    /// Check an access token, including revocation.
    pub async fn authenticate(&self, access_token: &str) -> Result<Claims> {
        let claims = self.tokens.verify(access_token, TokenKind::Access)?;
        self.check_user_type(&claims)?;

        if !self
            .tokens
            .is_fresh(self.kind.as_str(), &claims.username, claims.iat)
            .await
        {
            return Err(ServerError::unauthorized("Session expired"));
        }

        Ok(claims)
    }

    pub async fn profile(&self, username: &str) -> Result<Principal> {
        self.find(username).await
    }

    pub async fn short_profile(&self, username: &str) -> Result<ShortProfile> {
        self.find(username).await.map(|p| ShortProfile::from(&p))
    }

    pub async fn update_profile(
        &self,
        username: &str,
        update: ProfileUpdate,
    ) -> Result<Principal> {
        let patch = update.into_patch()?;
        self.find(username).await?;

        self.repository.update(username, &patch).await?;
        self.find(username).await
    }

    /// Change the password of a signed-in principal. Every token issued
    /// before the change stops working.
    pub async fn update_password(
        &self,
        username: &str,
        current: &str,
        new: &str,
    ) -> Result<()> {
        check_password_policy(new)?;
        let principal = self.find(username).await?;

        self.guard_password(username, "update").await?;

        if !self.passwords.verify_password(current, &principal.password) {
            return Err(ServerError::validation("Incorrect password"));
        }

        self.reset_password(username, new).await
    }

    /// Send a reset code. Unknown numbers get `None` and no code, with the
    /// same outcome shape.
    pub async fn forgot_password(&self, username: &str) -> Result<Option<String>> {
        check_phone_number(username)?;

        match self.repository.find(username).await {
            Ok(principal) if !principal.is_deleted => {},
            Ok(_) | Err(ServerError::NotFound) => {
                tracing::debug!(kind = %self.kind, %username, "reset asked for unknown account");
                return Ok(None);
            },
            Err(err) => return Err(err),
        }

        let otp = self.otp.issue(username, Purpose::ForgotPassword).await?;
        self.otp
            .store(username, Purpose::ForgotPassword, &otp, self.forgot_ttl)
            .await?;
        self.deliver(username, &otp).await;

        Ok(Some(otp))
    }

    /// Set a new password with a reset code.
    pub async fn set_password(
        &self,
        username: &str,
        otp: &str,
        password: &str,
    ) -> Result<()> {
        check_phone_number(username)?;
        check_password_policy(password)?;

        self.otp
            .verify(username, Purpose::ForgotPassword, otp)
            .await?;

        self.reset_password(username, password).await
    }

    async fn reset_password(&self, username: &str, password: &str) -> Result<()> {
        let now = self.clock.now();
        let patch = PrincipalPatch {
            password: Some(self.passwords.hash_password(password).catch()?),
            last_reset_at: Some(now),
            ..Default::default()
        };

        if self.repository.update(username, &patch).await? == 0 {
            return Err(ServerError::validation("User not found"));
        }

        self.tokens
            .bump_watermark(self.kind.as_str(), username, now.timestamp())
            .await?;
        tracing::info!(kind = %self.kind, %username, "password reset");

        Ok(())
    }

    /// Soft delete.
    pub async fn delete(&self, username: &str) -> Result<Principal> {
        self.find(username).await?;

        let patch = PrincipalPatch {
            is_deleted: Some(true),
            ..Default::default()
        };
        self.repository.update(username, &patch).await?;

        self.repository
            .find(username)
            .await
            .map_err(|err| err.not_found_as("User not found"))
    }

    /// Remove the record for good.
    pub async fn purge(&self, username: &str) -> Result<Principal> {
        let principal = self
            .repository
            .find(username)
            .await
            .map_err(|err| err.not_found_as("User not found"))?;

        self.repository.purge(username).await?;
        tracing::info!(kind = %self.kind, %username, "account purged");

        Ok(principal)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::FixedClock;
    use crate::config::Argon2 as ArgonConfig;
    use crate::notify::RecordingSender;
    use crate::principal::MemoryAccountRepository;
    use axum::http::StatusCode;

    pub const USERNAME: &str = "01712345678";
    pub const PASSWORD: &str = "Harbor2020!";
    const NOW: i64 = 1_750_000_000;

    pub struct Harness {
        pub service: PrincipalService,
        pub clock: Arc<FixedClock>,
        pub sender: Arc<RecordingSender>,
        pub deps: Dependencies,
    }

    pub fn dependencies(clock: Arc<FixedClock>, sender: Arc<RecordingSender>) -> Dependencies {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        Dependencies {
            tokens: TokenService::new(
                "access-secret",
                "refresh-secret",
                chrono::Duration::minutes(30),
                chrono::Duration::days(7),
                Arc::clone(&cache),
                clock.clone(),
            ),
            cache,
            passwords: PasswordManager::new(Some(ArgonConfig {
                memory_cost: 1024,
                iterations: 1,
                parallelism: 1,
                hash_length: 32,
            }))
            .unwrap(),
            sender,
            clock,
            otp: OtpConfig::default(),
        }
    }

    pub fn harness(kind: PrincipalKind) -> Harness {
        let clock = Arc::new(FixedClock::new(NOW));
        let sender = Arc::new(RecordingSender::default());
        let deps = dependencies(clock.clone(), sender.clone());
        let service = PrincipalService::new(
            kind,
            Arc::new(MemoryAccountRepository::default()),
            &deps,
        );

        Harness {
            service,
            clock,
            sender,
            deps,
        }
    }

    /// Register and verify an account.
    pub async fn registered(kind: PrincipalKind) -> Harness {
        let h = harness(kind);
        let otp = h.service.signup(USERNAME, "Rahim Uddin", PASSWORD).await.unwrap();
        h.service.verify_signup(USERNAME, &otp).await.unwrap();
        h
    }

    #[tokio::test]
    async fn test_signup_then_verify_creates_active_account() {
        let h = harness(PrincipalKind::Customer);

        let otp = h.service.signup(USERNAME, " Rahim Uddin ", PASSWORD).await.unwrap();
        assert_eq!(otp.len(), 5);
        assert_eq!(h.sender.sent.lock().unwrap().len(), 1);

        // Not durable before verification.
        assert!(h.service.profile(USERNAME).await.is_err());

        h.service.verify_signup(USERNAME, &otp).await.unwrap();
        let principal = h.service.profile(USERNAME).await.unwrap();
        assert_eq!(principal.full_name, "Rahim Uddin");
        assert_eq!(principal.status, Status::Active);
        assert!(principal.is_verified);
        assert_ne!(principal.password, PASSWORD);
        assert!(principal.password.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_signup_rejects_bad_input_and_duplicates() {
        let h = registered(PrincipalKind::Customer).await;

        let err = h.service.signup("0123", "A", PASSWORD).await.unwrap_err();
        assert_eq!(err.to_string(), "Phone number is not valid");

        let err = h.service.signup("01812345678", "A", "short").await.unwrap_err();
        assert_eq!(err.to_string(), "Must be at least 8 characters long");

        let err = h.service.signup(USERNAME, "A", PASSWORD).await.unwrap_err();
        assert_eq!(err.to_string(), "User already exists");
    }

    #[tokio::test]
    async fn test_signup_survives_delivery_failure() {
        let clock = Arc::new(FixedClock::new(NOW));
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..Default::default()
        });
        let deps = dependencies(clock, sender);
        let service = PrincipalService::new(
            PrincipalKind::Customer,
            Arc::new(MemoryAccountRepository::default()),
            &deps,
        );

        assert!(service.signup(USERNAME, "Rahim Uddin", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_signup_with_wrong_code() {
        let h = harness(PrincipalKind::Merchant);
        h.service.signup(USERNAME, "Karim", PASSWORD).await.unwrap();

        let err = h.service.verify_signup(USERNAME, "99999x").await.unwrap_err();
        assert_eq!(err.to_string(), "OTP expired");
    }

    #[tokio::test]
    async fn test_login_and_authenticate() {
        let h = registered(PrincipalKind::Customer).await;

        let pair = h.service.login(USERNAME, PASSWORD).await.unwrap();
        let claims = h.service.authenticate(&pair.access_token).await.unwrap();
        assert_eq!(claims.username, USERNAME);
        assert_eq!(claims.user_type, "customer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_failures_look_the_same() {
        let h = registered(PrincipalKind::Customer).await;

        let err = h.service.login(USERNAME, "Wrong2020!").await.unwrap_err();
        assert_eq!(err.to_string(), "Incorrect username or password");
        tokio::time::advance(PASSWORD_LEASE).await;

        let err = h.service.login("01899999999", PASSWORD).await.unwrap_err();
        assert_eq!(err.to_string(), "Incorrect username or password");
    }

    #[tokio::test]
    async fn test_login_is_serialized() {
        let h = registered(PrincipalKind::Customer).await;

        h.service.login(USERNAME, PASSWORD).await.unwrap();
        let err = h.service.login(USERNAME, PASSWORD).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_merchant_token_is_restricted_on_customer_routes() {
        let merchants = registered(PrincipalKind::Merchant).await;
        let pair = merchants.service.login(USERNAME, PASSWORD).await.unwrap();

        let customers = PrincipalService::new(
            PrincipalKind::Customer,
            Arc::new(MemoryAccountRepository::default()),
            &merchants.deps,
        );
        let err = customers.authenticate(&pair.access_token).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Restricted to customers");
    }

    #[tokio::test(start_paused = true)]
    async fn test_password_change_revokes_older_tokens() {
        let h = registered(PrincipalKind::Customer).await;
        let before = h.service.login(USERNAME, PASSWORD).await.unwrap();

        h.clock.advance(60);
        h.service
            .update_password(USERNAME, PASSWORD, "Harbor2021!")
            .await
            .unwrap();

        let err = h.service.authenticate(&before.access_token).await.unwrap_err();
        assert_eq!(err.to_string(), "Session expired");
        let err = h.service.refresh(&before.refresh_token).await.unwrap_err();
        assert_eq!(err.to_string(), "Session expired");

        h.clock.advance(10);
        tokio::time::advance(PASSWORD_LEASE).await;
        let after = h.service.login(USERNAME, "Harbor2021!").await.unwrap();
        h.service.authenticate(&after.access_token).await.unwrap();
    }

    /// Holds the first armed `find` after reading, until released.
    #[derive(Default)]
    struct StallingRepository {
        inner: MemoryAccountRepository,
        armed: std::sync::atomic::AtomicBool,
        read: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl AccountRepository for StallingRepository {
        async fn find(&self, username: &str) -> Result<Principal> {
            let principal = self.inner.find(username).await;
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                self.read.notify_one();
                self.release.notified().await;
            }
            principal
        }

        async fn insert(&self, principal: &Principal) -> Result<()> {
            self.inner.insert(principal).await
        }

        async fn update(&self, username: &str, patch: &PrincipalPatch) -> Result<u64> {
            self.inner.update(username, patch).await
        }

        async fn purge(&self, username: &str) -> Result<u64> {
            self.inner.purge(username).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_racing_password_change_keeps_revocation() {
        let clock = Arc::new(FixedClock::new(NOW));
        let deps = dependencies(clock.clone(), Arc::new(RecordingSender::default()));
        let repository = Arc::new(StallingRepository::default());
        let service = PrincipalService::new(
            PrincipalKind::Customer,
            Arc::clone(&repository) as Arc<dyn AccountRepository>,
            &deps,
        );
        let otp = service.signup(USERNAME, "Rahim Uddin", PASSWORD).await.unwrap();
        service.verify_signup(USERNAME, &otp).await.unwrap();

        let stolen = service.login(USERNAME, PASSWORD).await.unwrap();
        clock.advance(60);
        tokio::time::advance(PASSWORD_LEASE).await;

        // This login reads the record, then waits while the password changes.
        repository.armed.store(true, std::sync::atomic::Ordering::SeqCst);
        let racing = tokio::spawn({
            let service = service.clone();
            async move { service.login(USERNAME, PASSWORD).await }
        });
        repository.read.notified().await;

        service
            .update_password(USERNAME, PASSWORD, "Harbor2021!")
            .await
            .unwrap();
        let err = service.authenticate(&stolen.access_token).await.unwrap_err();
        assert_eq!(err.to_string(), "Session expired");

        repository.release.notify_one();
        racing.await.unwrap().unwrap();

        let err = service.authenticate(&stolen.access_token).await.unwrap_err();
        assert_eq!(err.to_string(), "Session expired");
        let err = service.refresh(&stolen.refresh_token).await.unwrap_err();
        assert_eq!(err.to_string(), "Session expired");
    }

    #[tokio::test]
    async fn test_update_password_with_wrong_current() {
        let h = registered(PrincipalKind::Customer).await;
        let err = h
            .service
            .update_password(USERNAME, "Nope2020!", "Harbor2021!")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Incorrect password");
    }

    #[tokio::test]
    async fn test_refresh_reissues() {
        let h = registered(PrincipalKind::Customer).await;
        let pair = h.service.login(USERNAME, PASSWORD).await.unwrap();

        let renewed = h.service.refresh(&pair.refresh_token).await.unwrap();
        h.service.authenticate(&renewed.access_token).await.unwrap();

        // An access token is not a refresh token.
        let err = h.service.refresh(&pair.access_token).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[tokio::test]
    async fn test_forgot_and_set_password() {
        let h = registered(PrincipalKind::Customer).await;

        assert_eq!(h.service.forgot_password("01899999999").await.unwrap(), None);

        let otp = h.service.forgot_password(USERNAME).await.unwrap().unwrap();
        h.clock.advance(5);
        h.service
            .set_password(USERNAME, &otp, "Harbor2022!")
            .await
            .unwrap();

        h.service.login(USERNAME, "Harbor2022!").await.unwrap();
    }

    #[tokio::test]
    async fn test_profile_update() {
        let h = registered(PrincipalKind::Customer).await;

        let update = ProfileUpdate {
            gender: Some(" Female ".into()),
            email: Some("Rahim@Example.COM".into()),
            occupation: Some("   ".into()),
            ..Default::default()
        };
        let principal = h.service.update_profile(USERNAME, update).await.unwrap();
        assert_eq!(principal.gender.as_deref(), Some("female"));
        assert_eq!(principal.email.as_deref(), Some("rahim@example.com"));
        assert_eq!(principal.occupation, None);

        let err = h
            .service
            .update_profile(
                USERNAME,
                ProfileUpdate {
                    gender: Some("robot".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid gender");

        let err = h
            .service
            .update_profile(USERNAME, ProfileUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Nothing to update");
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let h = registered(PrincipalKind::Customer).await;

        let deleted = h.service.delete(USERNAME).await.unwrap();
        assert!(deleted.is_deleted);
        let err = h.service.profile(USERNAME).await.unwrap_err();
        assert_eq!(err.to_string(), "User not found");
        let err = h.service.login(USERNAME, PASSWORD).await.unwrap_err();
        assert_eq!(err.to_string(), "Incorrect username or password");

        h.service.purge(USERNAME).await.unwrap();
        let err = h.service.purge(USERNAME).await.unwrap_err();
        assert_eq!(err.to_string(), "User not found");
    }
}
