//! Configuration management for the registration engine.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Call `dotenvy::dotenv()` first to pick up a local `.env` file.

use crate::environment::EnginePolicy;
use crate::lifecycle::EditPolicy;
use campus_fest_runtime::DispatchMode;
use campus_fest_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ticket id prefix (`FEST_TICKET_PREFIX`)
    pub ticket_prefix: String,
    /// Compare-and-swap retry settings
    pub cas: CasConfig,
    /// How published-state edits to locked fields are treated (`FEST_EDIT_POLICY`)
    pub edit_policy: EditPolicy,
    /// Refuse to close teams smaller than the event minimum
    /// (`FEST_ENFORCE_TEAM_MIN_ON_CLOSE`)
    pub enforce_team_min_on_close: bool,
    /// Inline or detached side effects (`FEST_SIDE_EFFECTS`)
    pub side_effects: DispatchMode,
    /// Invite code collisions tolerated before team creation gives up
    /// (`FEST_INVITE_CODE_ATTEMPTS`)
    pub invite_code_attempts: u32,
    /// Default log filter when `RUST_LOG` is unset (`FEST_LOG_LEVEL`)
    pub log_level: String,
}

/// Optimistic-concurrency retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasConfig {
    /// Retries after the first conflict (`FEST_CAS_MAX_RETRIES`)
    pub max_retries: usize,
    /// First backoff in milliseconds (`FEST_CAS_INITIAL_DELAY_MS`)
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds (`FEST_CAS_MAX_DELAY_MS`)
    pub max_delay_ms: u64,
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            initial_delay_ms: 2,
            max_delay_ms: 50,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ticket_prefix: "TKT".to_string(),
            cas: CasConfig::default(),
            edit_policy: EditPolicy::default(),
            enforce_team_min_on_close: true,
            side_effects: DispatchMode::default(),
            invite_code_attempts: 5,
            log_level: "info".to_string(),
        }
    }
}

fn parse_dispatch_mode(value: &str) -> Option<DispatchMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "inline" => Some(DispatchMode::Inline),
        "detached" => Some(DispatchMode::Detached),
        _ => None,
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ticket_prefix: env::var("FEST_TICKET_PREFIX").unwrap_or(defaults.ticket_prefix),
            cas: CasConfig {
                max_retries: env::var("FEST_CAS_MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.cas.max_retries),
                initial_delay_ms: env::var("FEST_CAS_INITIAL_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.cas.initial_delay_ms),
                max_delay_ms: env::var("FEST_CAS_MAX_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.cas.max_delay_ms),
            },
            edit_policy: env::var("FEST_EDIT_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.edit_policy),
            enforce_team_min_on_close: env::var("FEST_ENFORCE_TEAM_MIN_ON_CLOSE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.enforce_team_min_on_close),
            side_effects: env::var("FEST_SIDE_EFFECTS")
                .ok()
                .and_then(|s| parse_dispatch_mode(&s))
                .unwrap_or(defaults.side_effects),
            invite_code_attempts: env::var("FEST_INVITE_CODE_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.invite_code_attempts),
            log_level: env::var("FEST_LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Backoff policy for compare-and-swap loops
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.cas.max_retries)
            .initial_delay(Duration::from_millis(self.cas.initial_delay_ms))
            .max_delay(Duration::from_millis(self.cas.max_delay_ms))
            .build()
    }

    /// Workflow policy switches
    #[must_use]
    pub const fn policy(&self) -> EnginePolicy {
        EnginePolicy {
            edit_policy: self.edit_policy,
            enforce_team_min_on_close: self.enforce_team_min_on_close,
            invite_code_attempts: self.invite_code_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.ticket_prefix, "TKT");
        assert_eq!(config.cas.max_retries, 8);
        assert_eq!(config.edit_policy, EditPolicy::Lenient);
        assert!(config.enforce_team_min_on_close);
        assert_eq!(config.side_effects, DispatchMode::Detached);
        assert_eq!(config.invite_code_attempts, 5);

        let retry = config.retry_policy();
        assert_eq!(retry.max_retries, 8);
        assert_eq!(retry.initial_delay, Duration::from_millis(2));
        assert_eq!(retry.max_delay, Duration::from_millis(50));
    }

    #[test]
    fn dispatch_mode_parsing() {
        assert_eq!(parse_dispatch_mode("Inline"), Some(DispatchMode::Inline));
        assert_eq!(parse_dispatch_mode(" detached "), Some(DispatchMode::Detached));
        assert_eq!(parse_dispatch_mode("sometimes"), None);
    }

    #[test]
    fn policy_mirrors_config() {
        let config = EngineConfig {
            edit_policy: EditPolicy::Strict,
            enforce_team_min_on_close: false,
            ..EngineConfig::default()
        };
        let policy = config.policy();
        assert_eq!(policy.edit_policy, EditPolicy::Strict);
        assert!(!policy.enforce_team_min_on_close);
    }
}
