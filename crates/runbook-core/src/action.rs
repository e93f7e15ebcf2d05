//! Action executor port.
//!
//! The engine never performs a step's effect itself; it hands the action name
//! and resolved parameters to an `ActionExecutor` supplied by the caller.

use runbook_types::action::ActionOutcome;
use runbook_types::workflow::Params;

/// Errors an executor can raise instead of returning an outcome.
///
/// The engine treats any `ActionError` exactly like an unsuccessful
/// `ActionOutcome`: the message becomes the step's error.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid parameters for '{action}': {message}")]
    InvalidParams { action: String, message: String },

    #[error("{0}")]
    Failed(String),
}

/// Performs the side effect a workflow step names.
///
/// Uses RPITIT for the async method, consistent with the workspace's
/// Rust 2024 edition approach.
pub trait ActionExecutor: Send + Sync {
    fn execute(
        &self,
        action: &str,
        params: &Params,
    ) -> impl std::future::Future<Output = Result<ActionOutcome, ActionError>> + Send;
}

impl<T: ActionExecutor> ActionExecutor for std::sync::Arc<T> {
    fn execute(
        &self,
        action: &str,
        params: &Params,
    ) -> impl std::future::Future<Output = Result<ActionOutcome, ActionError>> + Send {
        (**self).execute(action, params)
    }
}
