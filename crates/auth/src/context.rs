//! Composition root and request-scoped handle.
//!
//! [`AuthService`] is built once and shared. Each caller (a UI window, a
//! request, a test) gets its own [`AuthContext`] from it, which owns that
//! caller's session. Nothing here is global.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use clinic_core::{Clock, SystemClock, UserId};

use crate::activity::{ActivityEntry, ActivityKind, ActivityLog, TracingActivityLog, best_effort};
use crate::authenticate::{AuthError, AuthenticationManager};
use crate::authorize::{AuthorizationExplanation, AuthorizationGuard, AuthzError};
use crate::ownership::{Owned, ResourceKind};
use crate::registry::SessionRegistry;
use crate::session::{SessionError, SessionManager, SessionScratch, SessionState};
use crate::store::CredentialStore;
use crate::{AuthConfig, PasswordHashing, Permission, PermissionCatalog, Principal, Role};

/// Anything a guarded operation can fail with.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Denied(#[from] AuthzError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl AccessError {
    /// Text safe to show the caller. Denials never say what was missing.
    pub fn user_message(&self) -> String {
        match self {
            AccessError::Denied(err) => err.user_message().to_string(),
            other => other.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

pub struct AuthService<S> {
    config: AuthConfig,
    guard: AuthorizationGuard,
    authenticator: AuthenticationManager<S>,
    activity: Arc<dyn ActivityLog>,
    clock: Arc<dyn Clock>,
}

impl<S> AuthService<S>
where
    S: CredentialStore + Clone,
{
    pub fn builder(store: S) -> AuthServiceBuilder<S> {
        AuthServiceBuilder {
            store,
            config: AuthConfig::default(),
            hashing: None,
            activity: None,
            clock: None,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn guard(&self) -> &AuthorizationGuard {
        &self.guard
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        self.guard.catalog()
    }

    pub fn authenticator(&self) -> &AuthenticationManager<S> {
        &self.authenticator
    }

    /// A fresh handle with no session.
    pub fn context(self: &Arc<Self>) -> AuthContext<S> {
        AuthContext {
            session: SessionManager::new(self.config.session_timeout(), self.clock.clone(), self.activity.clone()),
            service: Arc::clone(self),
        }
    }

    /// A token-keyed registry sharing this service's timeout, clock and log.
    pub fn session_registry(&self) -> SessionRegistry {
        SessionRegistry::new(self.config.session_timeout(), self.clock.clone(), self.activity.clone())
    }

    fn audit(&self, entry: ActivityEntry) {
        best_effort("activity.record", self.activity.record(entry));
    }
}

pub struct AuthServiceBuilder<S> {
    store: S,
    config: AuthConfig,
    hashing: Option<PasswordHashing>,
    activity: Option<Arc<dyn ActivityLog>>,
    clock: Option<Arc<dyn Clock>>,
}

impl<S> AuthServiceBuilder<S>
where
    S: CredentialStore + Clone,
{
    pub fn config(mut self, config: AuthConfig) -> Self {
        self.config = config;
        self
    }

    pub fn password_hashing(mut self, hashing: PasswordHashing) -> Self {
        self.hashing = Some(hashing);
        self
    }

    pub fn activity_log(mut self, activity: Arc<dyn ActivityLog>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Arc<AuthService<S>> {
        let activity = self
            .activity
            .unwrap_or_else(|| Arc::new(TracingActivityLog));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let hashing = self.hashing.unwrap_or_else(PasswordHashing::standard);

        tracing::debug!(
            session_timeout_minutes = self.config.session_timeout_minutes,
            max_failed_attempts = self.config.max_failed_attempts,
            lockout_duration_minutes = self.config.lockout_duration_minutes,
            "auth service configured"
        );

        Arc::new(AuthService {
            authenticator: AuthenticationManager::new(
                self.store,
                self.config.lockout_policy(),
                hashing,
                activity.clone(),
                clock.clone(),
            ),
            guard: AuthorizationGuard::new(Arc::new(PermissionCatalog::standard())),
            config: self.config,
            activity,
            clock,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request-scoped handle
// ─────────────────────────────────────────────────────────────────────────────

/// One caller's view of the auth subsystem.
///
/// Every guarded call first applies lazy session expiry, then evaluates the
/// rule against the principal captured at login.
pub struct AuthContext<S> {
    service: Arc<AuthService<S>>,
    session: SessionManager,
}

impl<S> AuthContext<S>
where
    S: CredentialStore + Clone,
{
    /// Authenticate and start a session, replacing any current one.
    pub fn login(&mut self, username: &str, password: &str) -> Result<&Principal, AuthError> {
        let principal = self.service.authenticator.authenticate(username, password)?;
        Ok(&self.session.create(principal).principal)
    }

    /// Returns whether a session was active.
    pub fn logout(&mut self) -> bool {
        self.session.destroy()
    }

    pub fn is_authenticated(&mut self) -> bool {
        self.session.validate()
    }

    pub fn session_state(&mut self) -> SessionState {
        self.session.validate();
        self.session.state()
    }

    pub fn current_principal(&mut self) -> Option<&Principal> {
        self.session.current_principal()
    }

    /// Record user activity: validate, then slide the expiry forward.
    pub fn touch(&mut self) -> Result<&Principal, SessionError> {
        self.session.extend()?;
        self.session
            .current_principal()
            .ok_or(SessionError::NotAuthenticated)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn scratch_mut(&mut self) -> Result<&mut SessionScratch, SessionError> {
        self.session.scratch_mut()
    }

    /// `false` when no session is held.
    pub fn has_permission(&mut self, permission: Permission) -> bool {
        match self.session.current_principal() {
            Some(principal) => self.service.guard.has_permission(principal, permission),
            None => false,
        }
    }

    pub fn require_permission(&mut self, permission: Permission) -> Result<Principal, AccessError> {
        let principal = self.principal()?;
        let decision = self.service.guard.require_permission(&principal, permission);
        self.settle(principal, decision)
    }

    pub fn require_any_permission(&mut self, permissions: &[Permission]) -> Result<Principal, AccessError> {
        let principal = self.principal()?;
        let decision = self.service.guard.require_any_permission(&principal, permissions);
        self.settle(principal, decision)
    }

    pub fn require_role(&mut self, allowed: &[Role]) -> Result<Principal, AccessError> {
        let principal = self.principal()?;
        let decision = self.service.guard.require_role(&principal, allowed);
        self.settle(principal, decision)
    }

    pub fn filter_by_ownership<T, I>(&mut self, items: I, kind: ResourceKind) -> Result<Vec<T>, AccessError>
    where
        T: Owned,
        I: IntoIterator<Item = T>,
    {
        let principal = self.principal()?;
        Ok(self.service.guard.filter_by_ownership(items, kind, &principal))
    }

    pub fn require_owner_or_elevated<T>(&mut self, item: &T, kind: ResourceKind) -> Result<Principal, AccessError>
    where
        T: Owned + ?Sized,
    {
        let principal = self.principal()?;
        let decision = self.service.guard.require_owner_or_elevated(item, kind, &principal);
        self.settle(principal, decision)
    }

    pub fn explain(&mut self, permission: Permission) -> Result<AuthorizationExplanation, AccessError> {
        let principal = self.principal()?;
        Ok(self.service.guard.explain(&principal, permission))
    }

    pub fn change_password(&mut self, current: &str, new: &str) -> Result<(), AccessError> {
        let principal = self.principal()?;
        self.service
            .authenticator
            .change_password(principal.user_id, current, new)?;
        Ok(())
    }

    pub fn reset_password(&mut self, target: UserId, new: &str) -> Result<(), AccessError> {
        let actor = self.require_permission(Permission::ResetPasswords)?;
        self.service.authenticator.reset_password(&actor, target, new)?;
        Ok(())
    }

    pub fn unlock_account(&mut self, target: UserId) -> Result<(), AccessError> {
        let actor = self.require_permission(Permission::UnlockAccounts)?;
        self.service.authenticator.unlock_account(&actor, target)?;
        Ok(())
    }

    fn principal(&mut self) -> Result<Principal, SessionError> {
        self.session.check().map(|session| session.principal.clone())
    }

    fn settle(&self, principal: Principal, decision: Result<(), AuthzError>) -> Result<Principal, AccessError> {
        match decision {
            Ok(()) => Ok(principal),
            Err(err) => {
                self.service.audit(
                    ActivityEntry::new(
                        Some(principal.user_id),
                        principal.username.as_str(),
                        ActivityKind::AccessDenied,
                        self.service.clock.now(),
                    )
                    .with_metadata(json!({ "reason": err.to_string() })),
                );
                Err(err.into())
            }
        }
    }
}
