//! # Submitter Configuration
//!
//! Defaults, environment overrides and validation.
//!
//! | Field | Default | Environment |
//! |-------|---------|-------------|
//! | `retention_secs` | 86 400 (24 h) | `PW_RETENTION_SECS` |
//! | `max_cached_entries` | 256 | `PW_MAX_CACHED_ENTRIES` |
//! | `confirmation_timeout_ms` | 60 000 | `PW_CONFIRMATION_TIMEOUT_MS` |
//! | `retry.max_attempts` | 5 | `PW_RETRY_MAX_ATTEMPTS` |
//! | `retry.initial_backoff_ms` | 500 | `PW_RETRY_INITIAL_BACKOFF_MS` |
//! | `retry.max_backoff_ms` | 10 000 | `PW_RETRY_MAX_BACKOFF_MS` |

use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Caller-side retry policy for ambiguous outcomes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total submit attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first ambiguous outcome.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    ///
    /// Doubles each time, capped at `max_backoff_ms`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Submitter configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitterConfig {
    /// Age after which a cached payload is abandoned.
    pub retention_secs: u64,
    /// Hard cap on cached payloads; oldest evicted first.
    pub max_cached_entries: usize,
    /// Bound on the confirmation wait.
    pub confirmation_timeout_ms: u64,
    /// Policy used by `submit_with_retry`.
    pub retry: RetryPolicy,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 3600,
            max_cached_entries: 256,
            confirmation_timeout_ms: 60_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl SubmitterConfig {
    /// Confirmation wait as a `Duration`.
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    /// Retention window in milliseconds.
    pub fn retention_ms(&self) -> u64 {
        self.retention_secs.saturating_mul(1000)
    }

    /// Defaults overridden by `PW_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `PW_*` key.
    ///
    /// Unparseable values are skipped with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        override_from(&lookup, "PW_RETENTION_SECS", &mut config.retention_secs);
        override_from(&lookup, "PW_MAX_CACHED_ENTRIES", &mut config.max_cached_entries);
        override_from(
            &lookup,
            "PW_CONFIRMATION_TIMEOUT_MS",
            &mut config.confirmation_timeout_ms,
        );
        override_from(&lookup, "PW_RETRY_MAX_ATTEMPTS", &mut config.retry.max_attempts);
        override_from(
            &lookup,
            "PW_RETRY_INITIAL_BACKOFF_MS",
            &mut config.retry.initial_backoff_ms,
        );
        override_from(&lookup, "PW_RETRY_MAX_BACKOFF_MS", &mut config.retry.max_backoff_ms);

        config
    }

    /// Reject values that would break the submission protocol.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_secs == 0 {
            return Err(invalid("retention_secs", "must be positive"));
        }
        if self.max_cached_entries == 0 {
            return Err(invalid("max_cached_entries", "must be positive"));
        }
        if self.confirmation_timeout_ms == 0 {
            return Err(invalid("confirmation_timeout_ms", "must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(invalid(
                "retry.initial_backoff_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn override_from<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!("[pw-submitter] Ignoring unparseable {}={:?}", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SubmitterConfig::default();
        assert_eq!(config.retention_secs, 86_400);
        assert_eq!(config.max_cached_entries, 256);
        assert_eq!(config.confirmation_timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = SubmitterConfig::from_lookup(lookup_from(&[
            ("PW_RETENTION_SECS", "3600"),
            ("PW_MAX_CACHED_ENTRIES", " 8 "),
            ("PW_RETRY_MAX_ATTEMPTS", "2"),
        ]));
        assert_eq!(config.retention_secs, 3600);
        assert_eq!(config.max_cached_entries, 8);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.confirmation_timeout_ms, 60_000);
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let config =
            SubmitterConfig::from_lookup(lookup_from(&[("PW_CONFIRMATION_TIMEOUT_MS", "soon")]));
        assert_eq!(config.confirmation_timeout_ms, 60_000);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = SubmitterConfig {
            retention_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config = SubmitterConfig {
            confirmation_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config = SubmitterConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = SubmitterConfig::default();
        config.retry.initial_backoff_ms = 20_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.initial_backoff_ms"));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(60), Duration::from_millis(1_000));
    }
}
