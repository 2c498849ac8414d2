//! Account lockout after repeated failed logins.
//!
//! Per account the policy is a two-state machine:
//!
//! ```text
//!   OPEN ──(failure reaches max_attempts)──▶ LOCKED
//!   LOCKED ──(checked at or after locked_until)──▶ OPEN  (counter reset)
//! ```
//!
//! Unlocking is lazy: nothing runs when a lock lapses. The next check notices
//! `now >= locked_until` and clears the counters as a side effect.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use clinic_core::UserId;

use crate::store::{CredentialStore, StoreError};
use crate::{LockoutState, UserRecord};

/// Upper bound on compare-and-swap retries for one counter update.
const MAX_CAS_ATTEMPTS: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Policy (pure)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failed attempts that arm the lock.
    pub max_attempts: u32,
    /// Fixed lock window.
    pub lockout_duration: Duration,
}

/// Result of evaluating an account's counters at a point in time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LockStatus {
    Open,
    Locked { until: DateTime<Utc> },
    /// A lock existed but its window is over; counters must be reset.
    Lapsed,
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockStatus::Locked { .. })
    }

    /// Time left on the lock, zero when not locked.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self {
            LockStatus::Locked { until } if *until > now => *until - now,
            _ => Duration::zero(),
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lockout_duration,
        }
    }

    pub fn evaluate(&self, state: &LockoutState, now: DateTime<Utc>) -> LockStatus {
        match state.locked_until {
            Some(until) if now < until => LockStatus::Locked { until },
            Some(_) => LockStatus::Lapsed,
            // Threshold reached without a stored expiry: treat as a fresh lock
            // rather than as open.
            None if state.failed_attempts >= self.max_attempts => LockStatus::Locked {
                until: now + self.lockout_duration,
            },
            None => LockStatus::Open,
        }
    }

    /// Counters after one more failed attempt.
    pub fn after_failure(&self, state: &LockoutState, now: DateTime<Utc>) -> LockoutState {
        let base = match self.evaluate(state, now) {
            LockStatus::Lapsed => LockoutState::cleared(),
            _ => *state,
        };
        let failed_attempts = base.failed_attempts.saturating_add(1);
        let locked_until = if failed_attempts >= self.max_attempts {
            base.locked_until.or(Some(now + self.lockout_duration))
        } else {
            None
        };
        LockoutState {
            failed_attempts,
            locked_until,
        }
    }

    pub fn after_success(&self) -> LockoutState {
        LockoutState::cleared()
    }

    /// Attempts left before the lock arms.
    pub fn remaining_attempts(&self, state: &LockoutState) -> u32 {
        self.max_attempts.saturating_sub(state.failed_attempts)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tracker (policy applied to the store)
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of recording one failed attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FailureRecorded {
    pub state: LockoutState,
    /// This failure is the one that armed the lock.
    pub locked_now: bool,
}

/// Applies [`LockoutPolicy`] transitions to stored counters.
///
/// Every write is a compare-and-swap against the counters just read, retried
/// on conflict, so concurrent failures are all counted.
#[derive(Debug, Clone)]
pub struct LockoutTracker<S> {
    store: S,
    policy: LockoutPolicy,
}

impl<S> LockoutTracker<S>
where
    S: CredentialStore,
{
    pub fn new(store: S, policy: LockoutPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Evaluate `record`'s lock, healing lapsed locks and persisting
    /// fail-closed ones. Never returns [`LockStatus::Lapsed`].
    pub fn is_locked(&self, record: &UserRecord, now: DateTime<Utc>) -> Result<LockStatus, StoreError> {
        let mut current = record.lockout_state();
        for _ in 0..MAX_CAS_ATTEMPTS {
            let status = self.policy.evaluate(&current, now);
            let target = match status {
                LockStatus::Open => return Ok(status),
                LockStatus::Locked { until } if current.locked_until == Some(until) => {
                    return Ok(status);
                }
                LockStatus::Locked { until } => {
                    tracing::warn!(
                        user_id = %record.id,
                        failed_attempts = current.failed_attempts,
                        "lockout threshold reached without expiry; arming lock"
                    );
                    LockoutState {
                        failed_attempts: current.failed_attempts,
                        locked_until: Some(until),
                    }
                }
                LockStatus::Lapsed => LockoutState::cleared(),
            };

            if self.store.compare_and_swap_counters(record.id, current, target)? {
                if status == LockStatus::Lapsed {
                    tracing::info!(user_id = %record.id, "account lock lapsed; counters reset");
                    return Ok(LockStatus::Open);
                }
                return Ok(status);
            }
            current = self.reload(record.id)?;
        }
        Err(StoreError::Contended(record.id))
    }

    pub fn record_failure(&self, id: UserId, now: DateTime<Utc>) -> Result<FailureRecorded, StoreError> {
        self.update(id, |current| {
            let next = self.policy.after_failure(current, now);
            let locked_now = current.locked_until.is_none() && next.locked_until.is_some();
            (next, locked_now)
        })
        .map(|(state, locked_now)| FailureRecorded { state, locked_now })
    }

    /// Reset counters and clear any lock.
    pub fn record_success(&self, id: UserId) -> Result<(), StoreError> {
        self.update(id, |_| (self.policy.after_success(), ())).map(|_| ())
    }

    /// Administrative unlock; same effect as a successful login.
    pub fn unlock(&self, id: UserId) -> Result<(), StoreError> {
        self.record_success(id)
    }

    fn reload(&self, id: UserId) -> Result<LockoutState, StoreError> {
        self.store
            .find_by_id(id)?
            .map(|r| r.lockout_state())
            .ok_or(StoreError::NotFound(id))
    }

    fn update<T>(
        &self,
        id: UserId,
        transition: impl Fn(&LockoutState) -> (LockoutState, T),
    ) -> Result<(LockoutState, T), StoreError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.reload(id)?;
            let (next, extra) = transition(&current);
            if next == current {
                return Ok((next, extra));
            }
            if self.store.compare_and_swap_counters(id, current, next)? {
                return Ok((next, extra));
            }
        }
        Err(StoreError::Contended(id))
    }
}
