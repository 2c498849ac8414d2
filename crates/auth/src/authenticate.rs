//! Credential verification.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use thiserror::Error;

use clinic_core::{Clock, SessionId, UserId};

use crate::activity::{ActivityEntry, ActivityKind, ActivityLog, best_effort};
use crate::lockout::{LockStatus, LockoutPolicy, LockoutTracker};
use crate::password::{PASSWORD_MAX_LEN, PasswordError, PasswordHashing, validate_new_password};
use crate::store::{CredentialStore, StoreError};
use crate::user::normalize_username;
use crate::Principal;

/// Outcome of a failed authentication step.
///
/// `Display` is the user-facing text. `InvalidCredentials` is
/// identical for "no such user", "inactive user" and "wrong password".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed input; nothing was read from the store.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error("Account is locked. Try again in {} minute(s).", whole_minutes_ceil(.remaining))]
    AccountLocked { remaining: Duration },

    #[error("Authentication is temporarily unavailable.")]
    Unavailable(#[source] StoreError),

    #[error("Password could not be processed.")]
    Hashing(String),

    /// Target of an administrative action does not exist.
    #[error("No account exists with id {0}.")]
    UnknownAccount(UserId),
}

impl From<PasswordError> for AuthError {
    fn from(value: PasswordError) -> Self {
        match value {
            PasswordError::Hashing(msg) => AuthError::Hashing(msg),
            other => AuthError::Validation(other.to_string()),
        }
    }
}

fn whole_minutes_ceil(d: &Duration) -> i64 {
    let secs = d.num_seconds().max(0);
    ((secs + 59) / 60).max(1)
}

/// Check submitted credentials before anything touches the store.
///
/// Returns the canonical username.
pub fn validate_login_input(username: &str, password: &str) -> Result<String, AuthError> {
    let username = normalize_username(username).map_err(|e| match e {
        clinic_core::DomainError::Validation(msg) => AuthError::Validation(msg),
        other => AuthError::Validation(other.to_string()),
    })?;
    if password.is_empty() {
        return Err(AuthError::Validation("password is required".to_string()));
    }
    if password.chars().count() > PASSWORD_MAX_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at most {PASSWORD_MAX_LEN} characters"
        )));
    }
    Ok(username)
}

/// Plaintext behind the decoy hash. No account record carries that hash.
const DECOY_PASSWORD: &str = "decoy-password-0";

/// Verifies credentials against the store and the lockout policy.
pub struct AuthenticationManager<S> {
    store: S,
    lockout: LockoutTracker<S>,
    hashing: PasswordHashing,
    /// Verified against when no usable account exists.
    decoy_hash: Option<String>,
    activity: Arc<dyn ActivityLog>,
    clock: Arc<dyn Clock>,
}

impl<S> AuthenticationManager<S>
where
    S: CredentialStore + Clone,
{
    pub fn new(
        store: S,
        policy: LockoutPolicy,
        hashing: PasswordHashing,
        activity: Arc<dyn ActivityLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let decoy_hash = best_effort("password.decoy_hash", hashing.hash(DECOY_PASSWORD));
        Self {
            lockout: LockoutTracker::new(store.clone(), policy),
            store,
            hashing,
            decoy_hash,
            activity,
            clock,
        }
    }

    pub fn lockout(&self) -> &LockoutTracker<S> {
        &self.lockout
    }

    pub fn hashing(&self) -> &PasswordHashing {
        &self.hashing
    }

    /// Verify `username`/`password` and capture a [`Principal`] with a fresh
    /// session id.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        let username = validate_login_input(username, password)?;
        let now = self.clock.now();

        let record = match self.store.find_by_username(&username).map_err(AuthError::Unavailable)? {
            Some(record) if record.is_active => record,
            other => {
                let (user_id, reason) = match other {
                    Some(inactive) => (Some(inactive.id), "inactive"),
                    None => (None, "unknown_user"),
                };
                self.burn_verification(password);
                tracing::info!(%username, reason, "login rejected");
                self.audit(
                    ActivityEntry::new(user_id, username.as_str(), ActivityKind::LoginFailed, now)
                        .with_metadata(json!({ "reason": reason })),
                );
                return Err(AuthError::InvalidCredentials);
            }
        };

        let status = self
            .lockout
            .is_locked(&record, now)
            .map_err(AuthError::Unavailable)?;
        if let LockStatus::Locked { until } = status {
            tracing::info!(user_id = %record.id, %until, "login rejected: account locked");
            self.audit(
                ActivityEntry::new(Some(record.id), username.as_str(), ActivityKind::LoginFailed, now)
                    .with_metadata(json!({ "reason": "locked", "locked_until": until })),
            );
            return Err(AuthError::AccountLocked {
                remaining: status.remaining(now),
            });
        }

        if !self.hashing.verify(password, &record.password_hash) {
            let recorded = best_effort("lockout.record_failure", self.lockout.record_failure(record.id, now));
            let attempts = recorded.map(|r| r.state.failed_attempts);
            tracing::info!(user_id = %record.id, failed_attempts = attempts, "login rejected: wrong password");
            self.audit(
                ActivityEntry::new(Some(record.id), username.as_str(), ActivityKind::LoginFailed, now)
                    .with_metadata(json!({ "reason": "bad_password", "failed_attempts": attempts })),
            );
            if let Some(recorded) = recorded.filter(|r| r.locked_now) {
                tracing::warn!(
                    user_id = %record.id,
                    locked_until = ?recorded.state.locked_until,
                    "account locked after repeated failures"
                );
                self.audit(
                    ActivityEntry::new(Some(record.id), username.as_str(), ActivityKind::AccountLocked, now)
                        .with_metadata(json!({
                            "failed_attempts": recorded.state.failed_attempts,
                            "locked_until": recorded.state.locked_until,
                        })),
                );
            }
            return Err(AuthError::InvalidCredentials);
        }

        best_effort("lockout.record_success", self.lockout.record_success(record.id));
        best_effort("credentials.update_last_login", self.store.update_last_login(record.id, now));

        let principal = Principal::from_record(&record, SessionId::generate(), now);
        tracing::info!(
            user_id = %principal.user_id,
            role = %principal.role,
            session_id = %principal.session_id,
            "login succeeded"
        );
        self.audit(
            ActivityEntry::new(Some(record.id), username.as_str(), ActivityKind::LoginSucceeded, now)
                .with_metadata(json!({ "session_id": principal.session_id })),
        );
        Ok(principal)
    }

    /// Self-service password change; the current password must verify.
    pub fn change_password(&self, user_id: UserId, current: &str, new: &str) -> Result<(), AuthError> {
        validate_new_password(new)?;
        let record = self
            .store
            .find_by_id(user_id)
            .map_err(AuthError::Unavailable)?
            .ok_or(AuthError::InvalidCredentials)?;
        if !self.hashing.verify(current, &record.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        if current == new {
            return Err(AuthError::Validation(
                "new password must differ from the current one".to_string(),
            ));
        }

        let hash = self.hashing.hash(new)?;
        self.store
            .update_password(user_id, hash)
            .map_err(AuthError::Unavailable)?;

        tracing::info!(%user_id, "password changed");
        self.audit(ActivityEntry::new(
            Some(user_id),
            record.username,
            ActivityKind::PasswordChanged,
            self.clock.now(),
        ));
        Ok(())
    }

    /// Administrative reset. The caller has already authorized `actor`.
    pub fn reset_password(&self, actor: &Principal, target: UserId, new: &str) -> Result<(), AuthError> {
        validate_new_password(new)?;
        let record = self
            .store
            .find_by_id(target)
            .map_err(AuthError::Unavailable)?
            .ok_or(AuthError::UnknownAccount(target))?;
        let hash = self.hashing.hash(new)?;
        self.store
            .update_password(target, hash)
            .map_err(AuthError::Unavailable)?;

        tracing::info!(actor = %actor.user_id, target = %target, "password reset");
        self.audit(
            ActivityEntry::new(Some(target), record.username, ActivityKind::PasswordReset, self.clock.now())
                .with_metadata(json!({ "reset_by": actor.user_id })),
        );
        Ok(())
    }

    /// Administrative unlock. The caller has already authorized `actor`.
    pub fn unlock_account(&self, actor: &Principal, target: UserId) -> Result<(), AuthError> {
        let record = self
            .store
            .find_by_id(target)
            .map_err(AuthError::Unavailable)?
            .ok_or(AuthError::UnknownAccount(target))?;
        self.lockout.unlock(target).map_err(AuthError::Unavailable)?;

        tracing::info!(actor = %actor.user_id, target = %target, "account unlocked");
        self.audit(
            ActivityEntry::new(Some(target), record.username, ActivityKind::AccountUnlocked, self.clock.now())
                .with_metadata(json!({ "unlocked_by": actor.user_id })),
        );
        Ok(())
    }

    /// Run one verification whose result is discarded.
    fn burn_verification(&self, password: &str) {
        if let Some(decoy) = &self.decoy_hash {
            let _ = self.hashing.verify(password, decoy);
        }
    }

    fn audit(&self, entry: ActivityEntry) {
        best_effort("activity.record", self.activity.record(entry));
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use clinic_core::ManualClock;

    use super::*;
    use crate::activity::InMemoryActivityLog;
    use crate::in_memory_store::InMemoryCredentialStore;
    use crate::{Role, UserRecord};

    fn manager() -> (AuthenticationManager<Arc<InMemoryCredentialStore>>, Arc<InMemoryCredentialStore>) {
        let store = InMemoryCredentialStore::arc();
        let hashing = PasswordHashing::low_cost();
        let record = UserRecord::new("drjane", hashing.hash("secret123").unwrap(), Role::Doctor, "Jane Doe", Utc::now())
            .unwrap();
        store.insert(record).unwrap();
        store
            .insert(
                UserRecord::new("retired", hashing.hash("retired123").unwrap(), Role::Doctor, "Old Timer", Utc::now())
                    .unwrap()
                    .deactivated(),
            )
            .unwrap();
        let manager = AuthenticationManager::new(
            store.clone(),
            LockoutPolicy::new(5, Duration::minutes(15)),
            hashing,
            InMemoryActivityLog::arc(),
            Arc::new(ManualClock::starting_now()),
        );
        (manager, store)
    }

    #[test]
    fn every_rejection_path_pays_for_one_verification() {
        let (manager, _store) = manager();
        let verifications = || manager.hashing().verifications();

        let before = verifications();
        assert_eq!(manager.authenticate("drjane", "wrong1234").unwrap_err(), AuthError::InvalidCredentials);
        assert_eq!(verifications() - before, 1);

        let before = verifications();
        assert_eq!(manager.authenticate("ghost", "wrong1234").unwrap_err(), AuthError::InvalidCredentials);
        assert_eq!(verifications() - before, 1);

        let before = verifications();
        assert_eq!(manager.authenticate("retired", "retired123").unwrap_err(), AuthError::InvalidCredentials);
        assert_eq!(verifications() - before, 1);
    }

    #[test]
    fn admin_actions_on_missing_accounts_say_so() {
        let (manager, store) = manager();
        let record = store.find_by_username("drjane").unwrap().unwrap();
        let actor = Principal::from_record(&record, SessionId::generate(), Utc::now());
        let ghost = UserId::new();

        let err = manager.unlock_account(&actor, ghost).unwrap_err();
        assert_eq!(err, AuthError::UnknownAccount(ghost));
        assert!(err.to_string().starts_with("No account exists"));
        assert_eq!(
            manager.reset_password(&actor, ghost, "fresh4567").unwrap_err(),
            AuthError::UnknownAccount(ghost)
        );
    }

    #[test]
    fn validation_runs_before_anything_else() {
        assert!(matches!(validate_login_input("", "pw"), Err(AuthError::Validation(_))));
        assert!(matches!(validate_login_input("drjane", ""), Err(AuthError::Validation(_))));
        assert!(matches!(
            validate_login_input("drjane", &"p".repeat(PASSWORD_MAX_LEN + 1)),
            Err(AuthError::Validation(_))
        ));
        assert_eq!(validate_login_input(" DrJane ", "pw").unwrap(), "drjane");
    }

    #[test]
    fn locked_message_rounds_up_to_whole_minutes() {
        let err = AuthError::AccountLocked {
            remaining: Duration::seconds(14 * 60 + 1),
        };
        assert_eq!(err.to_string(), "Account is locked. Try again in 15 minute(s).");

        let almost_done = AuthError::AccountLocked {
            remaining: Duration::seconds(5),
        };
        assert_eq!(almost_done.to_string(), "Account is locked. Try again in 1 minute(s).");
    }

    #[test]
    fn password_policy_errors_map_to_validation() {
        let err: AuthError = PasswordError::Length.into();
        assert!(matches!(err, AuthError::Validation(_)));
    }
}
