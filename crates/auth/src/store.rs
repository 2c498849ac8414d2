//! Credential store boundary.
//!
//! The store owns user records; this crate only reads them and applies
//! counter/password/last-login updates through the narrow interface below.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use clinic_core::UserId;

use crate::{LockoutState, UserRecord};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user not found: {0}")]
    NotFound(UserId),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("concurrent update did not settle for user {0}")]
    Contended(UserId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Lookup and update of user records.
///
/// ## Atomicity
///
/// `compare_and_swap_counters` is the only write that races: two bad passwords
/// against the same account at the same time. Implementations must apply it as
/// a single conditional write (e.g. `UPDATE … WHERE failed_attempts = $old AND
/// locked_until IS NOT DISTINCT FROM $old_until`) so neither increment is lost.
pub trait CredentialStore: Send + Sync {
    /// Find a record by its canonical (lowercase) username.
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;

    /// Replace the lockout counters iff they still equal `expected`.
    ///
    /// Returns `Ok(false)` when another writer got there first.
    fn compare_and_swap_counters(
        &self,
        id: UserId,
        expected: LockoutState,
        new: LockoutState,
    ) -> Result<bool, StoreError>;

    fn update_password(&self, id: UserId, password_hash: String) -> Result<(), StoreError>;

    fn update_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        (**self).find_by_username(username)
    }

    fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        (**self).find_by_id(id)
    }

    fn compare_and_swap_counters(
        &self,
        id: UserId,
        expected: LockoutState,
        new: LockoutState,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap_counters(id, expected, new)
    }

    fn update_password(&self, id: UserId, password_hash: String) -> Result<(), StoreError> {
        (**self).update_password(id, password_hash)
    }

    fn update_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).update_last_login(id, at)
    }
}
