//! Global configuration types for Runbook.
//!
//! `GlobalConfig` represents the top-level `config.toml` in the data
//! directory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.runbook/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Where workflow documents live. Defaults to `<data_dir>/workflows`.
    #[serde(default)]
    pub workflows_dir: Option<PathBuf>,

    /// Timeout applied to steps that declare none.
    #[serde(default)]
    pub default_step_timeout_secs: Option<f64>,

    /// Capacity of the run event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            workflows_dir: None,
            default_step_timeout_secs: None,
            event_capacity: default_event_capacity(),
        }
    }
}
