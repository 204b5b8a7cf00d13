//! Configuration loader for hostdesk.
//!
//! Reads `config.toml` from the data directory (`~/.hostdesk/` in
//! production) and deserializes it into [`ChatConfig`]. Falls back to the
//! defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use hostdesk_types::config::ChatConfig;

/// Resolve the data directory: `HOSTDESK_DATA_DIR` env var, falling back
/// to `~/.hostdesk`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HOSTDESK_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".hostdesk")
}

/// Load chat configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`ChatConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_chat_config(data_dir: &Path) -> ChatConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ChatConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ChatConfig::default();
        }
    };

    match toml::from_str::<ChatConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ChatConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_chat_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_chat_config(tmp.path()).await;
        assert_eq!(config.idle_timeout_secs, 1800);
        assert_eq!(config.typing_ceiling_secs, 5);
    }

    #[tokio::test]
    async fn load_chat_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(
            &config_path,
            r#"
idle_timeout_secs = 600
typing_ceiling_secs = 3
sweep_interval_secs = 10
"#,
        )
        .await
        .unwrap();

        let config = load_chat_config(tmp.path()).await;
        assert_eq!(config.idle_timeout_secs, 600);
        assert_eq!(config.typing_ceiling_secs, 3);
        assert_eq!(config.sweep_interval_secs, 10);
        // Unspecified fields keep their defaults
        assert_eq!(config.disconnect_grace_secs, 120);
    }

    #[tokio::test]
    async fn load_chat_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(&config_path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_chat_config(tmp.path()).await;
        assert_eq!(config.idle_timeout_secs, 1800);
    }
}
