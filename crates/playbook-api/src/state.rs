//! Application state wiring the engine to its collaborators.
//!
//! AppState holds the runner and the concrete capability adapters used by
//! both the CLI and the REST API. Adapters are picked from configuration:
//! an OpenAI-compatible analyst when its API key is present, webhook
//! notifications when any channel has a URL, the in-process fallbacks
//! otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use playbook_core::playbook::builtin::InMemoryTaskQueue;
use playbook_core::playbook::capability::Capabilities;
use playbook_core::playbook::runner::PlaybookRunner;
use playbook_infra::ai::OpenAiCompatAnalyst;
use playbook_infra::config::{load_engine_config, resolve_data_dir};
use playbook_infra::notify::WebhookNotifier;
use playbook_types::config::EngineConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<PlaybookRunner>,
    /// Approval and delegation tasks queued by runs.
    pub tasks: Arc<InMemoryTaskQueue>,
    pub data_dir: PathBuf,
    /// Human-readable name of the active analyst.
    pub analyst: String,
    /// Human-readable name of the active notifier.
    pub notifier: String,
}

impl AppState {
    /// Resolve the data directory, load `config.toml` and wire the runner.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_engine_config(&data_dir)
            .await
            .context("Failed to load engine configuration")?;
        Self::from_config(config, data_dir)
    }

    pub fn from_config(config: EngineConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        let tasks = Arc::new(InMemoryTaskQueue::new());
        let mut capabilities = Capabilities::builtin().with_tasks(tasks.clone());

        let analyst = match OpenAiCompatAnalyst::from_env(&config.ai)
            .context("Failed to build AI analyst client")?
        {
            Some(remote) => {
                let label = format!("openai-compatible ({})", remote.model());
                capabilities = capabilities.with_analyst(Arc::new(remote));
                label
            }
            None => {
                tracing::debug!(
                    env = %config.ai.api_key_env,
                    "AI API key not set, using offline analyst"
                );
                "offline".to_string()
            }
        };

        let notifier = if config.notifications.webhooks.is_empty() {
            "log".to_string()
        } else {
            let webhook = WebhookNotifier::new(&config.notifications)
                .context("Failed to build webhook notifier")?;
            capabilities = capabilities.with_notifier(Arc::new(webhook));
            let mut channels: Vec<&str> = config
                .notifications
                .webhooks
                .keys()
                .map(String::as_str)
                .collect();
            channels.sort_unstable();
            format!("webhook ({})", channels.join(", "))
        };

        tracing::info!(analyst = %analyst, notifier = %notifier, "capabilities wired");

        let runner = Arc::new(PlaybookRunner::with_capabilities(&capabilities, config));

        Ok(Self {
            runner,
            tasks,
            data_dir,
            analyst,
            notifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_use_offline_collaborators() {
        let mut config = EngineConfig::default();
        config.ai.api_key_env = "PLAYBOOK_TEST_KEY_THAT_IS_NEVER_SET".to_string();

        let state = AppState::from_config(config, PathBuf::from("/tmp/playbook")).unwrap();
        assert_eq!(state.analyst, "offline");
        assert_eq!(state.notifier, "log");
        assert!(state.runner.active_runs().is_empty());
    }

    #[test]
    fn configured_webhooks_select_webhook_notifier() {
        let mut config = EngineConfig::default();
        config.ai.api_key_env = "PLAYBOOK_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        config.notifications.webhooks = HashMap::from([
            ("slack".to_string(), "http://127.0.0.1:9/slack".to_string()),
            ("pager".to_string(), "http://127.0.0.1:9/pager".to_string()),
        ]);

        let state = AppState::from_config(config, PathBuf::from("/tmp/playbook")).unwrap();
        assert_eq!(state.notifier, "webhook (pager, slack)");
    }
}
