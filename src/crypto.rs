//! Password hashing and password policy.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;
use crate::error::{Result, ServerError};

const MIN_PASSWORD_CHARS: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
#[derive(Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(
        config: Option<ArgonConfig>,
    ) -> std::result::Result<Self, CryptoError> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash password using Argon2id with a random salt.
    pub fn hash_password(
        &self,
        password: impl AsRef<[u8]>,
    ) -> std::result::Result<String, CryptoError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Check a password against a PHC string. Unparseable hashes never
    /// match.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        let Ok(parsed) = PasswordHash::new(phc_hash) else {
            tracing::warn!("stored password hash is not a PHC string");
            return false;
        };

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .is_ok()
    }
}

/// Enforce the password policy: at least eight characters, one of them a
/// symbol or punctuation, and no whitespace or control characters.
pub fn check_password_policy(password: &str) -> Result<()> {
    let mut special = false;
    let mut invalid = false;
    let mut characters = 0;

    for c in password.chars() {
        if c.is_whitespace() || c.is_control() {
            invalid = true;
        } else if !c.is_alphanumeric() {
            special = true;
        }
        characters += 1;
    }

    if invalid {
        return Err(ServerError::validation(
            "Password contains invalid characters",
        ));
    }
    if characters < MIN_PASSWORD_CHARS {
        return Err(ServerError::validation(
            "Must be at least 8 characters long",
        ));
    }
    if !special {
        return Err(ServerError::validation(
            "Must contain at least one special character",
        ));
    }

    Ok(())
}
