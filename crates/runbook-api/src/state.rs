//! Application state shared by the CLI commands.
//!
//! Pins the repository to the JSON file store and carries the loaded
//! global config so `run` can size the event bus and apply step timeouts.

use std::path::PathBuf;

use runbook_infra::config::{load_global_config, resolve_data_dir, resolve_workflows_dir};
use runbook_infra::store::WorkflowStore;
use runbook_types::config::GlobalConfig;

pub struct AppState {
    pub store: WorkflowStore,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load `config.toml` and open the store.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_global_config(&data_dir).await;
        let workflows_dir = resolve_workflows_dir(&data_dir, &config);

        tracing::debug!(
            data_dir = %data_dir.display(),
            workflows_dir = %workflows_dir.display(),
            "application state initialized"
        );

        Ok(Self {
            store: WorkflowStore::new(workflows_dir),
            config,
            data_dir,
        })
    }
}
