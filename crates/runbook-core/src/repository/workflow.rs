//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions. The
//! infrastructure layer (runbook-infra) implements this trait with one JSON
//! document per workflow.

use runbook_types::error::RepositoryError;
use runbook_types::workflow::{Workflow, WorkflowSummary};

use crate::workflow::definition::validate_workflow;

/// Repository trait for workflow definition persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    /// Persist a workflow (insert or replace by ID), refreshing `updated_at`.
    ///
    /// Persists regardless of validation state; see `save_validated`.
    fn save(
        &self,
        workflow: &mut Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Load a workflow by ID, falling back to a lookup by name.
    fn load(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List summaries of every stored workflow, sorted by name.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowSummary>, RepositoryError>> + Send;

    /// Delete a workflow by ID. Returns `true` if it existed.
    fn delete(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Validate, then persist. Refuses to write a workflow with errors.
    fn save_validated(
        &self,
        workflow: &mut Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send {
        async move {
            let errors = validate_workflow(workflow);
            if !errors.is_empty() {
                return Err(RepositoryError::Invalid(errors.join("; ")));
            }
            self.save(workflow).await
        }
    }
}
