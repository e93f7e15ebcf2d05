//! JSON-file workflow store.
//!
//! One pretty-printed JSON document per workflow at `{dir}/{id}.json`.
//! Writes go through a temp file and a rename, serialised by a per-store
//! async mutex. Reads need no lock.

mod atomic;

use std::path::{Path, PathBuf};

use runbook_core::repository::workflow::WorkflowRepository;
use runbook_core::workflow::definition::{parse_workflow_json, touch};
use runbook_types::error::RepositoryError;
use runbook_types::workflow::{Workflow, WorkflowSummary};
use tokio::sync::Mutex;

pub use atomic::write_atomic;

/// File-backed implementation of [`WorkflowRepository`].
pub struct WorkflowStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl WorkflowStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Document path for a workflow ID.
    ///
    /// IDs become file names, so anything that could escape the store
    /// directory is rejected.
    pub fn path_for(&self, id: &str) -> Result<PathBuf, RepositoryError> {
        if !is_safe_id(id) {
            return Err(RepositoryError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read_document(path: &Path) -> Result<Option<Workflow>, RepositoryError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        parse_workflow_json(&text)
            .map(Some)
            .map_err(|e| RepositoryError::Invalid(format!("{}: {e}", path.display())))
    }

    /// Read every `*.json` document, in file name order. Unreadable or
    /// malformed files are skipped with a warning.
    async fn scan(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut workflows = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::read_document(&path).await {
                Ok(Some(workflow)) => workflows.push(workflow),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable workflow file");
                }
            }
        }
        Ok(workflows)
    }
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\', '\0'])
        && !id.contains("..")
}

impl WorkflowRepository for WorkflowStore {
    async fn save(&self, workflow: &mut Workflow) -> Result<(), RepositoryError> {
        let path = self.path_for(&workflow.id)?;
        touch(workflow);
        let body = serde_json::to_vec_pretty(&*workflow)?;

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        write_atomic(&path, body).await?;

        tracing::debug!(
            workflow_id = workflow.id.as_str(),
            path = %path.display(),
            "saved workflow"
        );
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Workflow>, RepositoryError> {
        if is_safe_id(key) {
            let path = self.path_for(key)?;
            if let Some(workflow) = Self::read_document(&path).await? {
                return Ok(Some(workflow));
            }
        }

        Ok(self.scan().await?.into_iter().find(|w| w.name == key))
    }

    async fn list(&self) -> Result<Vec<WorkflowSummary>, RepositoryError> {
        let mut summaries: Vec<WorkflowSummary> =
            self.scan().await?.iter().map(Workflow::summary).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let path = self.path_for(id)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(workflow_id = id, "deleted workflow");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for WorkflowStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStore").field("dir", &self.dir).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
