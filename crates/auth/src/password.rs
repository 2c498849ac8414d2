//! Password hashing (Argon2id) and password policy.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be between {PASSWORD_MIN_LEN} and {PASSWORD_MAX_LEN} characters")]
    Length,

    #[error("password must contain at least one letter and one digit")]
    Composition,

    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Argon2id hashing with configurable cost.
///
/// Verification always uses the parameters embedded in the stored PHC string,
/// so hashes made under an older cost keep verifying after a change.
///
/// Clones share one verification counter.
#[derive(Debug, Clone)]
pub struct PasswordHashing {
    params: Params,
    verifications: Arc<AtomicU64>,
}

impl PasswordHashing {
    /// Argon2id with the crate's recommended defaults (19 MiB, 2 passes).
    pub fn standard() -> Self {
        Self::with_params(Params::default())
    }

    /// Minimal cost. Only for tests and local demos.
    pub fn low_cost() -> Self {
        Self::with_params(Params::new(Params::MIN_M_COST, 1, 1, None).unwrap_or_default())
    }

    fn with_params(params: Params) -> Self {
        Self {
            params,
            verifications: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of full Argon2 verifications run so far.
    pub fn verifications(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    /// Constant-time check of `password` against a stored PHC hash.
    ///
    /// A malformed stored hash never verifies.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        let parsed = match PasswordHash::new(stored_hash) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "stored password hash is malformed");
                return false;
            }
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

impl Default for PasswordHashing {
    fn default() -> Self {
        Self::standard()
    }
}

/// Strength rules applied when a password is set or changed.
pub fn validate_new_password(password: &str) -> Result<(), PasswordError> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(PasswordError::Length);
    }
    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(PasswordError::Composition);
    }
    Ok(())
}
