//! Stored staff account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinic_core::{DomainError, DomainResult, UserId};

use crate::Role;

// ─────────────────────────────────────────────────────────────────────────────
// Lockout counters
// ─────────────────────────────────────────────────────────────────────────────

/// Failed-attempt bookkeeping of one account.
///
/// This is the unit the credential store swaps atomically; see
/// [`crate::CredentialStore::compare_and_swap_counters`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    pub fn cleared() -> Self {
        Self::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User record
// ─────────────────────────────────────────────────────────────────────────────

/// A staff account as held by the credential store.
///
/// `password_hash` is a PHC-formatted Argon2 string; the plain password never
/// leaves [`crate::password`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub full_name: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// New active account with clean counters.
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
        full_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let username = normalize_username(&username.into())?;
        let full_name = full_name.into().trim().to_string();
        if full_name.is_empty() {
            return Err(DomainError::validation("full name cannot be empty"));
        }

        Ok(Self {
            id: UserId::new(),
            username,
            password_hash: password_hash.into(),
            role,
            full_name,
            email: None,
            is_active: true,
            failed_attempts: 0,
            locked_until: None,
            last_login: None,
            created_at,
        })
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into().trim().to_lowercase());
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn lockout_state(&self) -> LockoutState {
        LockoutState {
            failed_attempts: self.failed_attempts,
            locked_until: self.locked_until,
        }
    }

    pub fn set_lockout_state(&mut self, state: LockoutState) {
        self.failed_attempts = state.failed_attempts;
        self.locked_until = state.locked_until;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Input validation
// ─────────────────────────────────────────────────────────────────────────────

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;

/// Trim and check a submitted username.
///
/// Usernames are 3–50 characters of ASCII letters, digits, `.`, `_` or `-`.
/// Matching is case-insensitive, so the canonical form is lowercase.
pub fn normalize_username(raw: &str) -> DomainResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("username is required"));
    }
    let len = trimmed.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(DomainError::validation(format!(
            "username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
        )));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(DomainError::validation(
            "username may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}
