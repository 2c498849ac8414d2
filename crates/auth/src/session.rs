//! Session lifecycle.
//!
//! ```text
//!   None ──create──▶ Active ──validate (idle past timeout)──▶ Expired
//!     ▲                │                                        │
//!     └────destroy─────┘◀──────────────create───────────────────┘
//! ```
//!
//! Expiry is lazy: nothing fires when the timeout passes. The next
//! `validate`/`check` notices and tears the session down, with the same
//! clearing a logout performs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;

use clinic_core::{Clock, SessionId, UserId};

use crate::Principal;
use crate::activity::{ActivityEntry, ActivityKind, ActivityLog, best_effort};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    None,
    Active,
    Expired,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("You are not signed in.")]
    NotAuthenticated,

    /// Re-login required; not a security block.
    #[error("Your session has expired. Please sign in again.")]
    Expired,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session-scoped scratch state
// ─────────────────────────────────────────────────────────────────────────────

/// Per-session cache: in-progress forms, the currently selected patient and
/// similar UI state. Dropped with the session on logout or expiry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionScratch {
    values: HashMap<String, JsonValue>,
}

impl SessionScratch {
    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> serde_json::Result<()> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    /// Typed read; `None` when absent or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.values.remove(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub principal: Principal,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    scratch: SessionScratch,
}

impl Session {
    pub fn scratch(&self) -> &SessionScratch {
        &self.scratch
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns at most one session for one actor.
///
/// One manager belongs to one request-scoped handle (see
/// [`crate::AuthContext`]) or one registry slot; it is never shared between
/// actors.
pub struct SessionManager {
    timeout: Duration,
    clock: Arc<dyn Clock>,
    activity: Arc<dyn ActivityLog>,
    session: Option<Session>,
    expired: bool,
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("timeout", &self.timeout)
            .field("session", &self.session)
            .field("expired", &self.expired)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>, activity: Arc<dyn ActivityLog>) -> Self {
        Self {
            timeout,
            clock,
            activity,
            session: None,
            expired: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Stored state. Does not evaluate the clock; call [`Self::validate`] for that.
    pub fn state(&self) -> SessionState {
        match (&self.session, self.expired) {
            (Some(_), _) => SessionState::Active,
            (None, true) => SessionState::Expired,
            (None, false) => SessionState::None,
        }
    }

    /// User holding the stored session, without evaluating expiry.
    pub fn holder(&self) -> Option<UserId> {
        self.session.as_ref().map(|s| s.principal.user_id)
    }

    /// Start a session for `principal`, replacing any current one.
    pub fn create(&mut self, principal: Principal) -> &Session {
        if self.session.is_some() {
            self.teardown(ActivityKind::Logout, "replaced");
        }
        let now = self.clock.now();
        tracing::debug!(session_id = %principal.session_id, user_id = %principal.user_id, "session created");
        self.expired = false;
        self.session.insert(Session {
            id: principal.session_id,
            principal,
            created_at: now,
            last_activity: now,
            expires_at: now + self.timeout,
            scratch: SessionScratch::default(),
        })
    }

    /// `true` while a session exists and has not aged out. An aged-out
    /// session is torn down here.
    pub fn validate(&mut self) -> bool {
        let now = self.clock.now();
        let aged_out = match &self.session {
            None => return false,
            Some(session) => session.is_expired_at(now),
        };
        if aged_out {
            self.teardown(ActivityKind::SessionExpired, "timeout");
            self.expired = true;
            return false;
        }
        true
    }

    /// Like [`Self::validate`], but says why there is no session.
    pub fn check(&mut self) -> Result<&Session, SessionError> {
        if !self.validate() {
            return Err(self.absent_reason());
        }
        self.session.as_ref().ok_or(SessionError::NotAuthenticated)
    }

    /// Sliding expiration: push the expiry to `now + timeout`.
    pub fn extend(&mut self) -> Result<DateTime<Utc>, SessionError> {
        if !self.validate() {
            return Err(self.absent_reason());
        }
        let now = self.clock.now();
        let timeout = self.timeout;
        let session = self.session.as_mut().ok_or(SessionError::NotAuthenticated)?;
        session.last_activity = session.last_activity.max(now);
        session.expires_at = session.expires_at.max(now + timeout);
        Ok(session.expires_at)
    }

    /// Logout. Returns whether a session was active.
    pub fn destroy(&mut self) -> bool {
        self.expired = false;
        if self.session.is_none() {
            return false;
        }
        self.teardown(ActivityKind::Logout, "logout");
        true
    }

    pub fn current_principal(&mut self) -> Option<&Principal> {
        if !self.validate() {
            return None;
        }
        self.session.as_ref().map(|s| &s.principal)
    }

    pub fn scratch_mut(&mut self) -> Result<&mut SessionScratch, SessionError> {
        if !self.validate() {
            return Err(self.absent_reason());
        }
        self.session
            .as_mut()
            .map(|s| &mut s.scratch)
            .ok_or(SessionError::NotAuthenticated)
    }

    /// Time until expiry, if a session is held.
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.session
            .as_ref()
            .map(|s| (s.expires_at - now).max(Duration::zero()))
    }

    fn absent_reason(&self) -> SessionError {
        if self.expired {
            SessionError::Expired
        } else {
            SessionError::NotAuthenticated
        }
    }

    /// Drop the session and everything scoped to it in one step.
    fn teardown(&mut self, kind: ActivityKind, reason: &'static str) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.scratch.clear();

        let now = self.clock.now();
        tracing::info!(
            session_id = %session.id,
            user_id = %session.principal.user_id,
            reason,
            "session ended"
        );
        let entry = ActivityEntry::new(
            Some(session.principal.user_id),
            session.principal.username,
            kind,
            now,
        )
        .with_metadata(json!({
            "session_id": session.id,
            "reason": reason,
            "last_activity": session.last_activity,
        }));
        best_effort("activity.record", self.activity.record(entry));
    }
}

#[cfg(test)]
mod tests {
    use clinic_core::{ManualClock, UserId};

    use super::*;
    use crate::activity::InMemoryActivityLog;
    use crate::Role;

    struct Fixture {
        clock: Arc<ManualClock>,
        log: Arc<InMemoryActivityLog>,
        manager: SessionManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let log = InMemoryActivityLog::arc();
        let manager = SessionManager::new(Duration::minutes(30), clock.clone(), log.clone());
        Fixture { clock, log, manager }
    }

    fn principal(clock: &ManualClock) -> Principal {
        Principal {
            user_id: UserId::new(),
            username: "nurse.amy".to_string(),
            role: Role::Assistant,
            full_name: "Amy Pond".to_string(),
            email: None,
            session_id: SessionId::generate(),
            logged_in_at: clock.now(),
        }
    }

    #[test]
    fn no_session_is_not_valid() {
        let mut f = fixture();
        assert_eq!(f.manager.state(), SessionState::None);
        assert!(!f.manager.validate());
        assert_eq!(f.manager.check().unwrap_err(), SessionError::NotAuthenticated);
    }

    #[test]
    fn session_expires_lazily() {
        let mut f = fixture();
        let p = principal(&f.clock);
        f.manager.create(p);
        f.manager.scratch_mut().unwrap().insert("draft_visit", &json!({ "bp": "120/80" })).unwrap();

        f.clock.advance(Duration::minutes(30));
        assert!(f.manager.validate(), "exactly at the timeout is still alive");

        f.clock.advance(Duration::seconds(1));
        assert_eq!(f.manager.state(), SessionState::Active, "state is not evaluated eagerly");
        assert!(!f.manager.validate());
        assert_eq!(f.manager.state(), SessionState::Expired);
        assert_eq!(f.manager.check().unwrap_err(), SessionError::Expired);
        assert!(f.manager.current_principal().is_none());
        assert_eq!(f.log.of_kind(ActivityKind::SessionExpired).len(), 1);
    }

    #[test]
    fn extend_keeps_session_alive_under_activity() {
        let mut f = fixture();
        f.manager.create(principal(&f.clock));
        for _ in 0..20 {
            f.clock.advance(Duration::minutes(25));
            f.manager.extend().unwrap();
        }
        assert!(f.manager.validate());
        assert_eq!(f.manager.remaining(), Some(Duration::minutes(30)));
    }

    #[test]
    fn extend_requires_active_session() {
        let mut f = fixture();
        assert_eq!(f.manager.extend().unwrap_err(), SessionError::NotAuthenticated);

        f.manager.create(principal(&f.clock));
        f.clock.advance(Duration::minutes(31));
        assert_eq!(f.manager.extend().unwrap_err(), SessionError::Expired);
    }

    #[test]
    fn destroy_clears_principal_and_scratch() {
        let mut f = fixture();
        f.manager.create(principal(&f.clock));
        f.manager.scratch_mut().unwrap().insert("selected_patient", &42).unwrap();

        assert!(f.manager.destroy());
        assert_eq!(f.manager.state(), SessionState::None);
        assert!(f.manager.current_principal().is_none());
        assert_eq!(f.manager.scratch_mut().unwrap_err(), SessionError::NotAuthenticated);
        assert_eq!(f.log.of_kind(ActivityKind::Logout).len(), 1);
        assert!(!f.manager.destroy());
    }

    #[test]
    fn new_session_starts_with_empty_scratch() {
        let mut f = fixture();
        f.manager.create(principal(&f.clock));
        f.manager.scratch_mut().unwrap().insert("draft", &"left over").unwrap();
        f.clock.advance(Duration::hours(1));
        assert!(!f.manager.validate());

        let session = f.manager.create(principal(&f.clock));
        assert!(session.scratch().is_empty());
    }

    #[test]
    fn scratch_typed_reads() {
        let mut scratch = SessionScratch::default();
        scratch.insert("patient_id", &17u64).unwrap();
        assert_eq!(scratch.get_as::<u64>("patient_id"), Some(17));
        assert_eq!(scratch.get_as::<String>("patient_id"), None);
        assert!(scratch.remove("patient_id").is_some());
        assert!(scratch.is_empty());
    }
}
