//! Bearer-token session registry.
//!
//! For exposing the subsystem remotely: the session id is handed out as an
//! opaque token and every request presents it. Each token maps to its own
//! [`SessionManager`], so expiry, sliding extension and teardown behave
//! exactly as for an in-process handle.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Duration;

use clinic_core::{Clock, SessionId};

use crate::Principal;
use crate::activity::ActivityLog;
use crate::session::{SessionError, SessionManager};

pub struct SessionRegistry {
    timeout: Duration,
    clock: Arc<dyn Clock>,
    activity: Arc<dyn ActivityLog>,
    sessions: RwLock<HashMap<SessionId, SessionManager>>,
}

impl SessionRegistry {
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>, activity: Arc<dyn ActivityLog>) -> Self {
        Self {
            timeout,
            clock,
            activity,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session for a freshly authenticated principal and return
    /// its bearer token. Any session the same user already holds is logged
    /// out first; one user holds at most one token.
    pub fn open(&self, principal: Principal) -> SessionId {
        let token = principal.session_id;
        let user_id = principal.user_id;

        let mut sessions = self.sessions.write().unwrap_or_else(|p| p.into_inner());
        let superseded: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, manager)| manager.holder() == Some(user_id))
            .map(|(held, _)| *held)
            .collect();
        for old in superseded {
            if let Some(mut manager) = sessions.remove(&old) {
                manager.destroy();
                tracing::debug!(session_id = %old, %user_id, "superseded session closed");
            }
        }

        let mut manager = SessionManager::new(self.timeout, self.clock.clone(), self.activity.clone());
        manager.create(principal);
        sessions.insert(token, manager);
        token
    }

    /// Per-request check: resolves the token, applies lazy expiry and slides
    /// the expiry forward on success.
    pub fn validate(&self, token: &SessionId) -> Result<Principal, SessionError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|p| p.into_inner());
        let manager = sessions.get_mut(token).ok_or(SessionError::NotAuthenticated)?;
        match manager.extend() {
            Ok(_) => manager
                .current_principal()
                .cloned()
                .ok_or(SessionError::NotAuthenticated),
            Err(err) => {
                sessions.remove(token);
                Err(err)
            }
        }
    }

    /// Logout by token. Returns whether the token was live.
    pub fn close(&self, token: &SessionId) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|p| p.into_inner());
        sessions
            .remove(token)
            .map(|mut manager| manager.destroy())
            .unwrap_or(false)
    }

    /// Tear down every aged-out session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(|p| p.into_inner());
        let before = sessions.len();
        sessions.retain(|_, manager| manager.validate());
        let purged = before - sessions.len();
        if purged > 0 {
            tracing::debug!(purged, "expired sessions purged");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use clinic_core::{ManualClock, UserId};

    use super::*;
    use crate::activity::{ActivityKind, InMemoryActivityLog};
    use crate::Role;

    fn principal(clock: &ManualClock) -> Principal {
        Principal {
            user_id: UserId::new(),
            username: "drjane".to_string(),
            role: Role::Doctor,
            full_name: "Jane Doe".to_string(),
            email: None,
            session_id: SessionId::generate(),
            logged_in_at: clock.now(),
        }
    }

    #[test]
    fn token_round_trip_and_sliding_expiry() {
        let clock = Arc::new(ManualClock::starting_now());
        let registry = SessionRegistry::new(Duration::minutes(10), clock.clone(), InMemoryActivityLog::arc());
        let token = registry.open(principal(&clock));

        clock.advance(Duration::minutes(8));
        assert_eq!(registry.validate(&token).unwrap().username, "drjane");
        clock.advance(Duration::minutes(8));
        assert!(registry.validate(&token).is_ok(), "previous request slid the expiry");

        clock.advance(Duration::minutes(11));
        assert_eq!(registry.validate(&token).unwrap_err(), SessionError::Expired);
        assert_eq!(registry.validate(&token).unwrap_err(), SessionError::NotAuthenticated);
        assert!(registry.is_empty());
    }

    #[test]
    fn reopening_for_the_same_user_retires_the_old_token() {
        let clock = Arc::new(ManualClock::starting_now());
        let log = InMemoryActivityLog::arc();
        let registry = SessionRegistry::new(Duration::minutes(10), clock.clone(), log.clone());

        let first = principal(&clock);
        let mut second = first.clone();
        second.session_id = SessionId::generate();
        let other_user = registry.open(principal(&clock));

        let old = registry.open(first);
        let new = registry.open(second);
        assert_eq!(registry.validate(&old).unwrap_err(), SessionError::NotAuthenticated);
        assert!(registry.validate(&new).is_ok());
        assert!(registry.validate(&other_user).is_ok());
        assert_eq!(registry.len(), 2);
        assert_eq!(log.of_kind(ActivityKind::Logout).len(), 1);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let clock = Arc::new(ManualClock::starting_now());
        let registry = SessionRegistry::new(Duration::minutes(10), clock, InMemoryActivityLog::arc());
        assert_eq!(
            registry.validate(&SessionId::generate()).unwrap_err(),
            SessionError::NotAuthenticated
        );
    }

    #[test]
    fn close_and_purge() {
        let clock = Arc::new(ManualClock::starting_now());
        let log = InMemoryActivityLog::arc();
        let registry = SessionRegistry::new(Duration::minutes(10), clock.clone(), log.clone());
        let a = registry.open(principal(&clock));
        let _b = registry.open(principal(&clock));

        assert!(registry.close(&a));
        assert!(!registry.close(&a));
        assert_eq!(log.of_kind(ActivityKind::Logout).len(), 1);

        clock.advance(Duration::minutes(11));
        assert_eq!(registry.purge_expired(), 1);
        assert_eq!(log.of_kind(ActivityKind::SessionExpired).len(), 1);
        assert!(registry.is_empty());
    }
}
