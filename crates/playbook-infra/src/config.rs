//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.playbook/` in production)
//! and deserializes it into [`EngineConfig`]. A missing file yields the
//! defaults; a file that exists but cannot be read or parsed is an error, so
//! a typo never silently reverts the engine to default approvers.

use std::path::{Path, PathBuf};

use playbook_types::config::EngineConfig;
use thiserror::Error;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PLAYBOOK_DATA_DIR";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `PLAYBOOK_DATA_DIR` environment variable
/// 2. `~/.playbook`
/// 3. `.playbook` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".playbook");
    }

    PathBuf::from(".playbook")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

/// Load engine configuration from `{data_dir}/config.toml`.
pub async fn load_engine_config(data_dir: &Path) -> Result<EngineConfig, ConfigError> {
    let path = config_path(data_dir);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return Ok(EngineConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };

    let config =
        toml::from_str::<EngineConfig>(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
    tracing::debug!("Loaded engine config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use playbook_types::config::BackoffStrategy;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await.unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            config_path(tmp.path()),
            r#"
default_assignee = "sre_team"
approval_window_hours = 8

[retry]
backoff = "exponential"
base_delay_ms = 250
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await.unwrap();
        assert_eq!(config.default_assignee, "sre_team");
        assert_eq!(config.approval_window_hours, 8);
        assert_eq!(config.retry.backoff, BackoffStrategy::Exponential);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.default_approver, "manager@domain.com");
    }

    #[tokio::test]
    async fn invalid_toml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(config_path(tmp.path()), "this is not { valid toml !!!")
            .await
            .unwrap();

        let err = load_engine_config(tmp.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn config_path_is_inside_data_dir() {
        let path = config_path(Path::new("/var/lib/playbook"));
        assert_eq!(path, PathBuf::from("/var/lib/playbook/config.toml"));
    }

    #[test]
    fn resolve_data_dir_is_never_empty() {
        assert!(!resolve_data_dir().as_os_str().is_empty());
    }
}
