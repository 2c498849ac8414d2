//! `clinic-auth`: authentication, sessions and role-based access control.
//!
//! This crate is decoupled from storage and UI: accounts come in through
//! [`CredentialStore`], audit rows go out through [`ActivityLog`], and time
//! comes from a [`clinic_core::Clock`].

pub mod activity;
pub mod authenticate;
pub mod authorize;
pub mod catalog;
pub mod config;
pub mod context;
pub mod in_memory_store;
pub mod lockout;
pub mod ownership;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod registry;
pub mod roles;
pub mod session;
pub mod store;
pub mod user;

pub use activity::{
    ActivityEntry, ActivityKind, ActivityLog, ActivityLogError, InMemoryActivityLog, PersistenceWarning,
    TracingActivityLog, best_effort,
};
pub use authenticate::{AuthError, AuthenticationManager, validate_login_input};
pub use authorize::{
    ACCESS_DENIED_MESSAGE, AuthorizationExplanation, AuthorizationGuard, AuthzError, DenialKind, DenialReason,
    PrincipalState,
};
pub use catalog::{CatalogDescription, PermissionCatalog, PermissionDefinition, RoleDefinition};
pub use config::{AuthConfig, ConfigError};
pub use context::{AccessError, AuthContext, AuthService, AuthServiceBuilder};
pub use in_memory_store::InMemoryCredentialStore;
pub use lockout::{FailureRecorded, LockStatus, LockoutPolicy, LockoutTracker};
pub use ownership::{OwnerField, OwnerFields, Owned, ResourceKind, Visibility};
pub use password::{PASSWORD_MAX_LEN, PASSWORD_MIN_LEN, PasswordError, PasswordHashing, validate_new_password};
pub use permissions::{Permission, PermissionGroup};
pub use principal::Principal;
pub use registry::SessionRegistry;
pub use roles::Role;
pub use session::{Session, SessionError, SessionManager, SessionScratch, SessionState};
pub use store::{CredentialStore, StoreError};
pub use user::{LockoutState, USERNAME_MAX_LEN, USERNAME_MIN_LEN, UserRecord, normalize_username};
