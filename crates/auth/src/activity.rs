//! Activity log (audit trail) sink.
//!
//! Writing to the activity log is bookkeeping, not part of any decision: a
//! failed write is logged as a [`PersistenceWarning`] and dropped. Use
//! [`best_effort`] at every call site that must not fail because of it.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use clinic_core::UserId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    LoginSucceeded,
    LoginFailed,
    AccountLocked,
    AccountUnlocked,
    Logout,
    SessionExpired,
    PasswordChanged,
    PasswordReset,
    AccessDenied,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::LoginSucceeded => "auth.login_succeeded",
            ActivityKind::LoginFailed => "auth.login_failed",
            ActivityKind::AccountLocked => "auth.account_locked",
            ActivityKind::AccountUnlocked => "auth.account_unlocked",
            ActivityKind::Logout => "auth.logout",
            ActivityKind::SessionExpired => "auth.session_expired",
            ActivityKind::PasswordChanged => "auth.password_changed",
            ActivityKind::PasswordReset => "auth.password_reset",
            ActivityKind::AccessDenied => "auth.access_denied",
        }
    }
}

/// One audit row.
///
/// `user_id` is absent when the submitted username matched no account; the
/// row is then keyed by `username` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub user_id: Option<UserId>,
    pub username: String,
    pub kind: ActivityKind,
    pub metadata: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        user_id: Option<UserId>,
        username: impl Into<String>,
        kind: ActivityKind,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            username: username.into(),
            kind,
            metadata: JsonValue::Null,
            occurred_at,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActivityLogError {
    #[error("activity log unavailable: {0}")]
    Unavailable(String),
}

pub trait ActivityLog: Send + Sync {
    fn record(&self, entry: ActivityEntry) -> Result<(), ActivityLogError>;
}

impl<L> ActivityLog for Arc<L>
where
    L: ActivityLog + ?Sized,
{
    fn record(&self, entry: ActivityEntry) -> Result<(), ActivityLogError> {
        (**self).record(entry)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Best-effort bookkeeping
// ─────────────────────────────────────────────────────────────────────────────

/// Non-fatal bookkeeping failure.
///
/// Logged once and dropped; never returned to the caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceWarning {
    pub operation: &'static str,
    pub error: String,
}

impl PersistenceWarning {
    fn emit(&self) {
        tracing::warn!(
            operation = self.operation,
            error = %self.error,
            "bookkeeping write failed; continuing"
        );
    }
}

/// Run a bookkeeping result through the warning path.
///
/// Returns the value on success, `None` (after logging) on failure.
pub fn best_effort<T, E>(operation: &'static str, result: Result<T, E>) -> Option<T>
where
    E: core::fmt::Display,
{
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            PersistenceWarning {
                operation,
                error: err.to_string(),
            }
            .emit();
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sinks
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory activity log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryActivityLog {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn of_kind(&self, kind: ActivityKind) -> Vec<ActivityEntry> {
        self.entries().into_iter().filter(|e| e.kind == kind).collect()
    }
}

impl ActivityLog for InMemoryActivityLog {
    fn record(&self, entry: ActivityEntry) -> Result<(), ActivityLogError> {
        self.entries
            .lock()
            .map_err(|_| ActivityLogError::Unavailable("lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

/// Emits each entry as a structured `tracing` event on the `activity` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn record(&self, entry: ActivityEntry) -> Result<(), ActivityLogError> {
        let user_id = entry.user_id.map(|id| id.to_string());
        tracing::info!(
            target: "activity",
            action = entry.kind.as_str(),
            user_id = user_id.as_deref(),
            username = %entry.username,
            metadata = %entry.metadata,
            occurred_at = %entry.occurred_at,
            "activity recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenLog;

    impl ActivityLog for BrokenLog {
        fn record(&self, _entry: ActivityEntry) -> Result<(), ActivityLogError> {
            Err(ActivityLogError::Unavailable("disk full".to_string()))
        }
    }

    #[test]
    fn best_effort_swallows_errors() {
        let entry = ActivityEntry::new(None, "ghost", ActivityKind::LoginFailed, Utc::now());
        assert_eq!(best_effort("activity.record", BrokenLog.record(entry)), None);
        assert_eq!(best_effort::<_, ActivityLogError>("noop", Ok(7)), Some(7));
    }

    #[test]
    fn in_memory_log_filters_by_kind() {
        let log = InMemoryActivityLog::new();
        let now = Utc::now();
        log.record(ActivityEntry::new(None, "a", ActivityKind::LoginFailed, now)).unwrap();
        log.record(ActivityEntry::new(None, "a", ActivityKind::Logout, now)).unwrap();
        assert_eq!(log.of_kind(ActivityKind::LoginFailed).len(), 1);
        assert_eq!(log.entries().len(), 2);
    }

    #[test]
    fn entry_serializes_kind_in_snake_case() {
        let entry = ActivityEntry::new(None, "a", ActivityKind::SessionExpired, Utc::now())
            .with_metadata(serde_json::json!({ "idle_minutes": 31 }));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "session_expired");
        assert_eq!(json["metadata"]["idle_minutes"], 31);
    }
}
