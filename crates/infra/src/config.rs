//! Configuration loading and representation.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Bounded retry for audit appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// No retries and no sleeping (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling up to 5 times.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff * (1u32 << attempt.saturating_sub(1).min(5))
    }
}

/// Runtime settings for the entitlement core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementsConfig {
    /// Upper bound on a route guard's context fetch.
    pub context_fetch_timeout: Duration,
    pub audit_retry: RetryPolicy,
}

impl Default for EntitlementsConfig {
    fn default() -> Self {
        Self {
            context_fetch_timeout: Duration::from_millis(2000),
            audit_retry: RetryPolicy::default(),
        }
    }
}

impl EntitlementsConfig {
    /// Defaults overridden by `CLINICOPS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`EntitlementsConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(ms) = parse_u64(&lookup, "CLINICOPS_CONTEXT_TIMEOUT_MS")? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    var: "CLINICOPS_CONTEXT_TIMEOUT_MS",
                    message: "must be greater than zero".to_string(),
                });
            }
            cfg.context_fetch_timeout = Duration::from_millis(ms);
        } else {
            tracing::debug!(
                timeout_ms = cfg.context_fetch_timeout.as_millis() as u64,
                "CLINICOPS_CONTEXT_TIMEOUT_MS not set; using default"
            );
        }

        if let Some(attempts) = parse_u64(&lookup, "CLINICOPS_AUDIT_MAX_ATTEMPTS")? {
            if attempts == 0 || attempts > u32::MAX as u64 {
                return Err(ConfigError::Invalid {
                    var: "CLINICOPS_AUDIT_MAX_ATTEMPTS",
                    message: format!("{attempts} is out of range"),
                });
            }
            cfg.audit_retry.max_attempts = attempts as u32;
        }

        if let Some(ms) = parse_u64(&lookup, "CLINICOPS_AUDIT_BACKOFF_MS")? {
            cfg.audit_retry.base_backoff = Duration::from_millis(ms);
        }

        Ok(cfg)
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                var,
                message: format!("'{raw}': {e}"),
            }),
    }
}
