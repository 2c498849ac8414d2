use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinic_core::{SessionId, UserId};

use crate::{Role, UserRecord};

/// Authenticated identity captured at login.
///
/// This is a snapshot: later edits to the stored account (role change,
/// deactivation) take effect at the next login, not mid-session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
    pub full_name: String,
    pub email: Option<String>,
    pub session_id: SessionId,
    pub logged_in_at: DateTime<Utc>,
}

impl Principal {
    pub fn from_record(record: &UserRecord, session_id: SessionId, logged_in_at: DateTime<Utc>) -> Self {
        Self {
            user_id: record.id,
            username: record.username.clone(),
            role: record.role,
            full_name: record.full_name.clone(),
            email: record.email.clone(),
            session_id,
            logged_in_at,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_the_record() {
        let record = UserRecord::new("DrJane", "hash", Role::Doctor, "Jane Doe", Utc::now())
            .unwrap()
            .with_email(" Jane@Clinic.Example ");
        let principal = Principal::from_record(&record, SessionId::generate(), Utc::now());

        assert_eq!(principal.username, "drjane");
        assert_eq!(principal.email.as_deref(), Some("jane@clinic.example"));
        assert!(principal.is_doctor());
        assert!(!principal.is_super_admin());
        assert!(!principal.is_assistant());
    }

    #[test]
    fn role_predicates_are_exclusive() {
        for role in Role::ALL {
            let record = UserRecord::new("someone", "hash", role, "Some One", Utc::now()).unwrap();
            let principal = Principal::from_record(&record, SessionId::generate(), Utc::now());
            let held = [principal.is_super_admin(), principal.is_doctor(), principal.is_assistant()];
            assert_eq!(held.iter().filter(|h| **h).count(), 1);
        }
    }
}
