//! Engine configuration types.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls
//! default assignees, deadline windows, timeouts, retry policy, and the
//! external AI/notification endpoints. All fields have sensible defaults, so
//! an empty file (or no file at all) yields a working engine.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the playbook engine.
///
/// Loaded from `~/.playbook/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Approver used by Approval steps without `assignedTo`.
    #[serde(default = "default_approver")]
    pub default_approver: String,

    /// Assignee used by Human steps without `assignedTo`.
    #[serde(default = "default_assignee")]
    pub default_assignee: String,

    /// Hours until an approval request expires.
    #[serde(default = "default_approval_window_hours")]
    pub approval_window_hours: u32,

    /// Hours until a delegated task is due, unless the step sets `durationHours`.
    #[serde(default = "default_delegation_window_hours")]
    pub delegation_window_hours: f64,

    /// Estimate recorded for steps that do not declare one.
    #[serde(default = "default_estimated_duration")]
    pub default_estimated_duration: String,

    /// Per-step execution timeout in seconds.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Broadcast channel capacity for run lifecycle events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Retry policy for capabilities backed by external calls.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// AI completion provider settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Notification transport settings.
    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_approver() -> String {
    "manager@domain.com".to_string()
}

fn default_assignee() -> String {
    "ops_team".to_string()
}

fn default_approval_window_hours() -> u32 {
    24
}

fn default_delegation_window_hours() -> f64 {
    2.0
}

fn default_estimated_duration() -> String {
    "5 minutes".to_string()
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_approver: default_approver(),
            default_assignee: default_assignee(),
            approval_window_hours: default_approval_window_hours(),
            delegation_window_hours: default_delegation_window_hours(),
            default_estimated_duration: default_estimated_duration(),
            step_timeout_secs: default_step_timeout_secs(),
            event_capacity: default_event_capacity(),
            retry: RetryPolicy::default(),
            ai: AiConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded retry with delayed backoff between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (default 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// How the delay grows with each failed attempt.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff: BackoffStrategy::default(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Linear: `attempt * base`. Exponential: `base * 2^(attempt - 1)`.
    /// Both are capped at `max_delay_ms`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let raw_ms = match self.backoff {
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Exponential => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                self.base_delay_ms.saturating_mul(factor)
            }
        };
        Duration::from_millis(raw_ms.min(self.max_delay_ms))
    }
}

/// Growth of the delay between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Linear,
    Exponential,
}

// ---------------------------------------------------------------------------
// External collaborators
// ---------------------------------------------------------------------------

/// Settings for the OpenAI-compatible analysis provider.
///
/// When the environment variable named by `api_key_env` is unset, the engine
/// falls back to the offline analyst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    30
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

/// Settings for the webhook notification dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Channel name -> webhook URL. Channels without a URL are logged only.
    #[serde(default)]
    pub webhooks: HashMap<String, String>,
    #[serde(default = "default_notification_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_notification_timeout_secs() -> u64 {
    10
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhooks: HashMap::new(),
            timeout_secs: default_notification_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.default_approver, "manager@domain.com");
        assert_eq!(config.default_assignee, "ops_team");
        assert_eq!(config.approval_window_hours, 24);
        assert!((config.delegation_window_hours - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.step_timeout(), Duration::from_secs(300));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff, BackoffStrategy::Linear);
    }

    #[test]
    fn test_engine_config_deserialize_empty_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
default_approver = "cab@domain.com"
step_timeout_secs = 60

[retry]
max_attempts = 5
base_delay_ms = 200
backoff = "exponential"

[ai]
model = "gpt-4.1"

[notifications.webhooks]
slack = "https://hooks.slack.example/T000"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_approver, "cab@domain.com");
        assert_eq!(config.default_assignee, "ops_team");
        assert_eq!(config.step_timeout_secs, 60);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff, BackoffStrategy::Exponential);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(config.ai.model, "gpt-4.1");
        assert_eq!(config.ai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(
            config.notifications.webhooks["slack"],
            "https://hooks.slack.example/T000"
        );
    }

    #[test]
    fn test_linear_backoff_grows_with_attempt() {
        let policy = RetryPolicy {
            base_delay_ms: 1000,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(3000));
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let policy = RetryPolicy {
            base_delay_ms: 100,
            backoff: BackoffStrategy::Exponential,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(4), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            base_delay_ms: 1000,
            backoff: BackoffStrategy::Exponential,
            max_delay_ms: 5000,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(10), Duration::from_millis(5000));
        assert_eq!(policy.delay_after(200), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_policy_defaults_from_partial_yaml_like_table() {
        let policy: RetryPolicy = toml::from_str("max_attempts = 2").unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay_ms, 1000);
    }
}
