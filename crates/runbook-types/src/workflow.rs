//! Workflow domain types for Runbook.
//!
//! Defines the persisted workflow record (`Workflow` / `WorkflowStep`), the
//! per-run reporting types (`StepStatus`, `StepReport`, `RunOutcome`,
//! `WorkflowResult`) and the list view (`WorkflowSummary`).
//!
//! The serde attributes here are the on-disk record shape: one JSON document
//! per workflow, with defaults applied for any field an older or hand-written
//! record leaves out.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Step parameters: an ordered JSON object.
pub type Params = serde_json::Map<String, Value>;

/// Default `max_steps` safety limit for a workflow.
pub const DEFAULT_MAX_STEPS: u32 = 100;

/// Default retry budget for a step.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retries, in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;

/// Name given to records that carry none.
pub const UNNAMED_WORKFLOW: &str = "Unnamed Workflow";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Generate a new workflow ID (UUIDv7, time-sortable).
pub fn new_workflow_id() -> String {
    Uuid::now_v7().to_string()
}

/// Generate a short step ID (8 hex characters).
pub fn new_step_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

// ---------------------------------------------------------------------------
// Error strategy
// ---------------------------------------------------------------------------

/// What happens after a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Stop the workflow (when `stop_on_error` is set).
    #[default]
    Stop,
    /// Re-run the step up to `max_retries` times.
    Retry,
    /// Tolerate the failure: never aborts the run, even with `stop_on_error`.
    Skip,
    /// Run `fallback_action` once after the step fails.
    Fallback,
}

impl fmt::Display for ErrorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorStrategy::Stop => write!(f, "stop"),
            ErrorStrategy::Retry => write!(f, "retry"),
            ErrorStrategy::Skip => write!(f, "skip"),
            ErrorStrategy::Fallback => write!(f, "fallback"),
        }
    }
}

impl FromStr for ErrorStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stop" => Ok(ErrorStrategy::Stop),
            "retry" => Ok(ErrorStrategy::Retry),
            "skip" => Ok(ErrorStrategy::Skip),
            "fallback" => Ok(ErrorStrategy::Fallback),
            other => Err(format!("invalid error strategy: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Step definition
// ---------------------------------------------------------------------------

/// A single step of a workflow, bound to a named external action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique within the workflow.
    #[serde(default = "new_step_id")]
    pub id: String,
    /// Human label, also accepted wherever a step ID is.
    #[serde(default)]
    pub name: String,
    /// Name of the action the executor should perform.
    pub action: String,
    /// Action parameters; string values starting with `$` are context references.
    #[serde(default)]
    pub params: Params,
    /// Step to run after success (id or name). `None` means next in order.
    #[serde(default)]
    pub on_success: Option<String>,
    /// Step to run after failure (id or name).
    #[serde(default)]
    pub on_failure: Option<String>,
    /// Guard: either `$variable` or a boolean expression over the context.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds to wait between retries.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    #[serde(default)]
    pub fallback_action: Option<String>,
    /// Per-attempt timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> f64 {
    DEFAULT_RETRY_DELAY_SECS
}

impl WorkflowStep {
    /// Create a step with default policy fields and a fresh ID.
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: new_step_id(),
            name: name.into(),
            action: action.into(),
            params: Params::new(),
            on_success: None,
            on_failure: None,
            condition: None,
            error_strategy: ErrorStrategy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            fallback_action: None,
            timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow definition
// ---------------------------------------------------------------------------

/// A persisted workflow definition.
///
/// A stored `Workflow` is a template. The engine never mutates it; every run
/// works on its own copy of the steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "new_workflow_id")]
    pub id: String,
    #[serde(default = "default_workflow_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Steps in declared order. The first step is the entry point.
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Abort the run when a step with the `stop` strategy fails.
    #[serde(default = "default_stop_on_error")]
    pub stop_on_error: bool,
    /// Hard ceiling on step executions per run (cycle safety).
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

fn default_workflow_name() -> String {
    UNNAMED_WORKFLOW.to_string()
}

fn default_stop_on_error() -> bool {
    true
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

impl Workflow {
    /// Create an empty workflow with a fresh ID.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_workflow_id(),
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
            stop_on_error: true,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Find a step by ID or name (ID wins).
    pub fn find_step(&self, reference: &str) -> Option<&WorkflowStep> {
        self.steps
            .iter()
            .find(|s| s.id == reference)
            .or_else(|| self.steps.iter().find(|s| s.name == reference))
    }

    /// List-view summary of this workflow.
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            steps: self.steps.len(),
        }
    }
}

/// Which branch link `connect` sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectOn {
    Success,
    Failure,
}

impl fmt::Display for ConnectOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectOn::Success => write!(f, "success"),
            ConnectOn::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for ConnectOn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(ConnectOn::Success),
            "failure" => Ok(ConnectOn::Failure),
            other => Err(format!("invalid connection condition: '{other}'")),
        }
    }
}

/// Workflow list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Number of steps.
    pub steps: usize,
}

// ---------------------------------------------------------------------------
// Run reporting
// ---------------------------------------------------------------------------

/// Runtime status of a step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Retrying,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Retrying => write!(f, "retrying"),
        }
    }
}

/// Final state of one step after a run, in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    /// Action invocations made for this step (retries and fallback included).
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Traversal ran out of steps with no failures.
    Completed,
    /// Traversal ran out of steps after failures that were all routed.
    CompletedWithFailures,
    /// A `stop` step failed with `stop_on_error` set.
    Aborted { step_id: String },
    /// A failed step had no failure route, so traversal could not continue.
    Halted { step_id: String },
    /// `stop()` was requested.
    Stopped,
    /// `max_steps` executions were used up.
    StepLimitReached,
    /// Another run was already active on the engine.
    Rejected,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::CompletedWithFailures => write!(f, "completed with failures"),
            RunOutcome::Aborted { step_id } => write!(f, "aborted at step '{step_id}'"),
            RunOutcome::Halted { step_id } => {
                write!(f, "halted at step '{step_id}' (no failure route)")
            }
            RunOutcome::Stopped => write!(f, "stopped"),
            RunOutcome::StepLimitReached => write!(f, "step limit reached"),
            RunOutcome::Rejected => write!(f, "rejected"),
        }
    }
}

/// Aggregate result of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// `true` iff no step failed (and the run was not rejected).
    pub success: bool,
    pub outcome: RunOutcome,
    pub steps_executed: u32,
    pub steps_failed: u32,
    pub duration_ms: u64,
    /// Step outputs keyed by step ID, in completion order.
    pub results: serde_json::Map<String, Value>,
    /// `"<step name>: <message>"` entries plus engine messages.
    pub errors: Vec<String>,
    #[serde(default)]
    pub steps: Vec<StepReport>,
}

impl WorkflowResult {
    /// Result for a run that never started.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            outcome: RunOutcome::Rejected,
            steps_executed: 0,
            steps_failed: 0,
            duration_ms: 0,
            results: serde_json::Map::new(),
            errors: vec![message.into()],
            steps: Vec::new(),
        }
    }

    /// Report for a step by ID.
    pub fn step(&self, id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_defaults_from_minimal_record() {
        let step: WorkflowStep = serde_json::from_value(json!({"action": "noop"})).unwrap();
        assert_eq!(step.id.len(), 8);
        assert_eq!(step.error_strategy, ErrorStrategy::Stop);
        assert_eq!(step.max_retries, 3);
        assert_eq!(step.retry_delay, 1.0);
        assert!(step.params.is_empty());
        assert!(step.timeout.is_none());
    }

    #[test]
    fn test_workflow_defaults_from_minimal_record() {
        let wf: Workflow = serde_json::from_value(json!({"steps": []})).unwrap();
        assert_eq!(wf.name, UNNAMED_WORKFLOW);
        assert!(wf.stop_on_error);
        assert_eq!(wf.max_steps, 100);
        assert!(Uuid::parse_str(&wf.id).is_ok());
    }

    #[test]
    fn test_record_shape_field_names() {
        let mut wf = Workflow::new("shape", "");
        wf.steps.push(WorkflowStep::new("first", "noop"));
        let value = serde_json::to_value(&wf).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "id",
                "name",
                "description",
                "steps",
                "created_at",
                "updated_at",
                "stop_on_error",
                "max_steps"
            ]
        );
        let step = &value["steps"][0];
        assert!(step.get("on_success").unwrap().is_null());
        assert_eq!(step["error_strategy"], json!("stop"));
    }

    #[test]
    fn test_error_strategy_from_str() {
        assert_eq!("Retry".parse::<ErrorStrategy>().unwrap(), ErrorStrategy::Retry);
        assert!("later".parse::<ErrorStrategy>().is_err());
    }

    #[test]
    fn test_find_step_prefers_id_over_name() {
        let mut wf = Workflow::new("lookup", "");
        let mut a = WorkflowStep::new("b", "noop");
        a.id = "a".into();
        let mut b = WorkflowStep::new("other", "noop");
        b.id = "b".into();
        wf.steps = vec![a, b];
        assert_eq!(wf.find_step("b").unwrap().name, "other");
        assert_eq!(wf.find_step("other").unwrap().id, "b");
    }

    #[test]
    fn test_outcome_serde_tag() {
        let v = serde_json::to_value(RunOutcome::Halted {
            step_id: "x".into(),
        })
        .unwrap();
        assert_eq!(v, json!({"kind": "halted", "step_id": "x"}));
    }

    #[test]
    fn test_rejected_result() {
        let r = WorkflowResult::rejected("busy");
        assert!(!r.success);
        assert_eq!(r.steps_executed, 0);
        assert_eq!(r.errors, vec!["busy".to_string()]);
    }
}
