//! Externally supplied auth constants.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::LockoutPolicy;

pub const ENV_SESSION_TIMEOUT_MINUTES: &str = "CLINIC_SESSION_TIMEOUT_MINUTES";
pub const ENV_MAX_FAILED_ATTEMPTS: &str = "CLINIC_MAX_FAILED_ATTEMPTS";
pub const ENV_LOCKOUT_DURATION_MINUTES: &str = "CLINIC_LOCKOUT_DURATION_MINUTES";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub session_timeout_minutes: u32,
    pub max_failed_attempts: u32,
    pub lockout_duration_minutes: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_timeout_minutes: 30,
            max_failed_attempts: 5,
            lockout_duration_minutes: 15,
        }
    }
}

impl AuthConfig {
    /// Defaults overridden by any `CLINIC_*` variables present in the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AuthConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &'static str, default: u32| -> Result<u32, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u32>() {
                    Ok(v) if v > 0 => Ok(v),
                    _ => Err(ConfigError::Invalid { key, value: raw }),
                },
            }
        };

        Ok(Self {
            session_timeout_minutes: read(ENV_SESSION_TIMEOUT_MINUTES, defaults.session_timeout_minutes)?,
            max_failed_attempts: read(ENV_MAX_FAILED_ATTEMPTS, defaults.max_failed_attempts)?,
            lockout_duration_minutes: read(ENV_LOCKOUT_DURATION_MINUTES, defaults.lockout_duration_minutes)?,
        })
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.session_timeout_minutes))
    }

    pub fn lockout_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.lockout_duration_minutes))
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(self.max_failed_attempts, self.lockout_duration())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_keys_use_defaults() {
        let config = AuthConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AuthConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = AuthConfig::from_lookup(lookup(&[
            (ENV_MAX_FAILED_ATTEMPTS, "3"),
            (ENV_LOCKOUT_DURATION_MINUTES, " 15 "),
        ]))
        .unwrap();
        assert_eq!(config.max_failed_attempts, 3);
        assert_eq!(config.lockout_policy().lockout_duration, Duration::minutes(15));
        assert_eq!(config.session_timeout(), Duration::minutes(30));
    }

    #[test]
    fn zero_and_garbage_are_rejected() {
        let err = AuthConfig::from_lookup(lookup(&[(ENV_SESSION_TIMEOUT_MINUTES, "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: ENV_SESSION_TIMEOUT_MINUTES,
                value: "0".to_string()
            }
        );
        assert!(AuthConfig::from_lookup(lookup(&[(ENV_MAX_FAILED_ATTEMPTS, "five")])).is_err());
    }
}
