use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use clinic_core::UserId;

use crate::store::{CredentialStore, StoreError};
use crate::{LockoutState, UserRecord};

/// In-memory credential store.
///
/// Intended for tests/dev. Every operation runs under one lock, which makes
/// the counter compare-and-swap trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add an account. Usernames are unique.
    pub fn insert(&self, record: UserRecord) -> Result<UserId, StoreError> {
        let mut users = self.write()?;
        if users.values().any(|u| u.username == record.username) {
            return Err(StoreError::UsernameTaken(record.username));
        }
        let id = record.id;
        users.insert(id, record);
        Ok(id)
    }

    /// Flip the active flag (admin deactivation).
    pub fn set_active(&self, id: UserId, active: bool) -> Result<(), StoreError> {
        let mut users = self.write()?;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        user.is_active = active;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.users.read().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<UserId, UserRecord>>, StoreError> {
        self.users
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<UserId, UserRecord>>, StoreError> {
        self.users
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.read()?;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let users = self.read()?;
        Ok(users.get(&id).cloned())
    }

    fn compare_and_swap_counters(
        &self,
        id: UserId,
        expected: LockoutState,
        new: LockoutState,
    ) -> Result<bool, StoreError> {
        let mut users = self.write()?;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if user.lockout_state() != expected {
            return Ok(false);
        }
        user.set_lockout_state(new);
        Ok(true)
    }

    fn update_password(&self, id: UserId, password_hash: String) -> Result<(), StoreError> {
        let mut users = self.write()?;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        user.password_hash = password_hash;
        Ok(())
    }

    fn update_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut users = self.write()?;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        user.last_login = Some(at);
        Ok(())
    }
}
