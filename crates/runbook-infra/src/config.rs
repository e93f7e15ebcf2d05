//! Global configuration loader for Runbook.
//!
//! Reads `config.toml` from the data directory (`~/.runbook/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use runbook_types::config::GlobalConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "RUNBOOK_DATA_DIR";

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `RUNBOOK_DATA_DIR` environment variable
/// 2. `~/.runbook`
/// 3. `./.runbook`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".runbook");
    }

    PathBuf::from(".runbook")
}

/// Directory holding workflow documents: the configured override, or
/// `{data_dir}/workflows`. Relative overrides are taken from `data_dir`.
pub fn resolve_workflows_dir(data_dir: &Path, config: &GlobalConfig) -> PathBuf {
    match &config.workflows_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => data_dir.join(dir),
        None => data_dir.join("workflows"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.event_capacity, 256);
        assert!(config.workflows_dir.is_none());
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            "default_step_timeout_secs = 12.5\nevent_capacity = 8\n",
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.default_step_timeout_secs, Some(12.5));
        assert_eq!(config.event_capacity, 8);
    }

    #[tokio::test]
    async fn load_global_config_malformed_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "event_capacity = [oops")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_resolve_workflows_dir() {
        let data_dir = PathBuf::from("/home/user/.runbook");
        let mut config = GlobalConfig::default();
        assert_eq!(
            resolve_workflows_dir(&data_dir, &config),
            PathBuf::from("/home/user/.runbook/workflows")
        );

        config.workflows_dir = Some(PathBuf::from("flows"));
        assert_eq!(
            resolve_workflows_dir(&data_dir, &config),
            PathBuf::from("/home/user/.runbook/flows")
        );

        config.workflows_dir = Some(PathBuf::from("/srv/flows"));
        assert_eq!(
            resolve_workflows_dir(&data_dir, &config),
            PathBuf::from("/srv/flows")
        );
    }

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is the only one touching the variable and restores it immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-runbook");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-runbook"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }
}
