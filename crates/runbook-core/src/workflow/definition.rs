//! Workflow definition builders, validation, and JSON record conversion.
//!
//! Everything here is pure: helpers mutate the `Workflow` they are handed and
//! never touch storage. Persisting the result is the repository's job.

use std::collections::HashSet;

use chrono::Utc;
use runbook_types::workflow::{
    ConnectOn, ErrorStrategy, Params, Workflow, WorkflowStep, new_step_id,
};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while converting workflow records.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// JSON serialization failure.
    #[error("serialization error: {0}")]
    SerializeError(String),
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Optional step fields for `add_step`. Unset fields take record defaults.
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    /// Explicit step ID; a fresh short ID is generated when absent.
    pub id: Option<String>,
    pub on_success: Option<String>,
    pub on_failure: Option<String>,
    pub condition: Option<String>,
    pub error_strategy: Option<ErrorStrategy>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<f64>,
    pub fallback_action: Option<String>,
    pub timeout: Option<f64>,
}

/// Create an empty workflow with a fresh UUIDv7 ID.
pub fn create(name: &str, description: &str) -> Workflow {
    Workflow::new(name, description)
}

/// Append a step and return it.
pub fn add_step<'a>(
    workflow: &'a mut Workflow,
    name: &str,
    action: &str,
    params: Params,
    options: StepOptions,
) -> &'a WorkflowStep {
    let mut step = WorkflowStep::new(name, action);
    step.id = options.id.unwrap_or_else(new_step_id);
    step.params = params;
    step.on_success = options.on_success;
    step.on_failure = options.on_failure;
    step.condition = options.condition;
    if let Some(strategy) = options.error_strategy {
        step.error_strategy = strategy;
    }
    if let Some(max_retries) = options.max_retries {
        step.max_retries = max_retries;
    }
    if let Some(delay) = options.retry_delay {
        step.retry_delay = delay;
    }
    step.fallback_action = options.fallback_action;
    step.timeout = options.timeout;

    let idx = workflow.steps.len();
    workflow.steps.push(step);
    &workflow.steps[idx]
}

/// Remove every step with the given ID. Returns whether anything was removed.
///
/// Links that pointed at the removed step are left alone; `validate_workflow`
/// reports them.
pub fn remove_step(workflow: &mut Workflow, step_id: &str) -> bool {
    let before = workflow.steps.len();
    workflow.steps.retain(|s| s.id != step_id);
    workflow.steps.len() != before
}

/// Point `from_step`'s success or failure link at `to_step`.
///
/// `from_step` matches by ID first, then by name. Returns `false` when no
/// such step exists. `to_step` is stored as given.
pub fn connect(workflow: &mut Workflow, from_step: &str, to_step: &str, on: ConnectOn) -> bool {
    let idx = workflow
        .steps
        .iter()
        .position(|s| s.id == from_step)
        .or_else(|| workflow.steps.iter().position(|s| s.name == from_step));

    let Some(idx) = idx else {
        return false;
    };
    let step = &mut workflow.steps[idx];
    match on {
        ConnectOn::Success => step.on_success = Some(to_step.to_string()),
        ConnectOn::Failure => step.on_failure = Some(to_step.to_string()),
    }
    true
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check a workflow for structural problems.
///
/// Returns every problem found; an empty list means the workflow is valid.
/// Validation never fails and never stops at the first problem.
pub fn validate_workflow(workflow: &Workflow) -> Vec<String> {
    let mut errors = Vec::new();

    if workflow.name.trim().is_empty() {
        errors.push("Workflow name is required".to_string());
    }
    if workflow.steps.is_empty() {
        errors.push("Workflow must have at least one step".to_string());
    }
    if workflow.max_steps == 0 {
        errors.push("max_steps must be greater than zero".to_string());
    }

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for step in &workflow.steps {
        if !seen.insert(step.id.as_str()) && reported.insert(step.id.as_str()) {
            errors.push(format!("Duplicate step ID: '{}'", step.id));
        }
    }

    let ids: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
    let names: HashSet<&str> = workflow.steps.iter().map(|s| s.name.as_str()).collect();
    let resolves = |reference: &str| ids.contains(reference) || names.contains(reference);

    for step in &workflow.steps {
        let label = step_label(step);

        if step.action.trim().is_empty() {
            errors.push(format!("Step '{label}': action is required"));
        }
        if let Some(target) = &step.on_success {
            if !resolves(target) {
                errors.push(format!(
                    "Step '{label}': on_success references unknown step '{target}'"
                ));
            }
        }
        if let Some(target) = &step.on_failure {
            if !resolves(target) {
                errors.push(format!(
                    "Step '{label}': on_failure references unknown step '{target}'"
                ));
            }
        }
        if !step.retry_delay.is_finite() || step.retry_delay < 0.0 {
            errors.push(format!(
                "Step '{label}': retry_delay must be a non-negative number"
            ));
        }
        if let Some(timeout) = step.timeout {
            if !timeout.is_finite() || timeout <= 0.0 {
                errors.push(format!("Step '{label}': timeout must be positive"));
            }
        }
        if step.error_strategy == ErrorStrategy::Fallback && step.fallback_action.is_none() {
            errors.push(format!(
                "Step '{label}': fallback strategy requires a fallback_action"
            ));
        }
        if !step.name.is_empty()
            && workflow
                .steps
                .iter()
                .any(|other| !std::ptr::eq(other, step) && other.id == step.name)
        {
            errors.push(format!(
                "Step '{label}': name is also the ID of another step"
            ));
        }
    }

    errors
}

fn step_label(step: &WorkflowStep) -> &str {
    if step.name.is_empty() { &step.id } else { &step.name }
}

// ---------------------------------------------------------------------------
// JSON records
// ---------------------------------------------------------------------------

/// Parse a persisted workflow record, applying record defaults.
///
/// Missing IDs get fresh ones, steps without a name are named after their
/// action, and missing policy fields take their documented defaults.
pub fn parse_workflow_json(json: &str) -> Result<Workflow, WorkflowError> {
    let mut workflow: Workflow =
        serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    for step in &mut workflow.steps {
        if step.name.is_empty() {
            step.name = step.action.clone();
        }
    }
    Ok(workflow)
}

/// Serialize a workflow to its pretty-printed record form.
pub fn serialize_workflow_json(workflow: &Workflow) -> Result<String, WorkflowError> {
    serde_json::to_string_pretty(workflow).map_err(|e| WorkflowError::SerializeError(e.to_string()))
}

/// Mark a workflow as modified now.
pub fn touch(workflow: &mut Workflow) {
    workflow.updated_at = Utc::now();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_step_workflow() -> Workflow {
        let mut wf = create("deploy", "ship it");
        add_step(
            &mut wf,
            "build",
            "noop",
            Params::new(),
            StepOptions {
                id: Some("a".into()),
                ..Default::default()
            },
        );
        add_step(
            &mut wf,
            "release",
            "noop",
            Params::new(),
            StepOptions {
                id: Some("b".into()),
                ..Default::default()
            },
        );
        wf
    }

    #[test]
    fn test_create_sets_fresh_identity() {
        let a = create("one", "");
        let b = create("two", "");
        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
        assert!(a.steps.is_empty());
        assert!(a.stop_on_error);
        assert_eq!(a.max_steps, 100);
    }

    #[test]
    fn test_add_step_defaults_and_options() {
        let mut wf = create("wf", "");
        let id = add_step(&mut wf, "first", "echo", Params::new(), StepOptions::default())
            .id
            .clone();
        assert_eq!(id.len(), 8);
        let step = &wf.steps[0];
        assert_eq!(step.error_strategy, ErrorStrategy::Stop);
        assert_eq!(step.max_retries, 3);
        assert_eq!(step.retry_delay, 1.0);

        let step = add_step(
            &mut wf,
            "second",
            "fail",
            Params::new(),
            StepOptions {
                error_strategy: Some(ErrorStrategy::Retry),
                max_retries: Some(5),
                retry_delay: Some(0.5),
                timeout: Some(2.0),
                ..Default::default()
            },
        );
        assert_eq!(step.max_retries, 5);
        assert_eq!(step.retry_delay, 0.5);
        assert_eq!(step.timeout, Some(2.0));
        assert_eq!(wf.steps.len(), 2);
    }

    #[test]
    fn test_remove_step() {
        let mut wf = two_step_workflow();
        assert!(remove_step(&mut wf, "a"));
        assert!(!remove_step(&mut wf, "a"));
        assert_eq!(wf.steps.len(), 1);
        assert_eq!(wf.steps[0].id, "b");
    }

    #[test]
    fn test_connect_by_id_and_name() {
        let mut wf = two_step_workflow();
        assert!(connect(&mut wf, "a", "release", ConnectOn::Failure));
        assert!(connect(&mut wf, "release", "a", ConnectOn::Success));
        assert!(!connect(&mut wf, "ghost", "a", ConnectOn::Success));
        assert_eq!(wf.steps[0].on_failure.as_deref(), Some("release"));
        assert_eq!(wf.steps[1].on_success.as_deref(), Some("a"));
    }

    #[test]
    fn test_validate_valid_workflow() {
        let mut wf = two_step_workflow();
        connect(&mut wf, "a", "release", ConnectOn::Success);
        assert!(validate_workflow(&wf).is_empty());
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let mut wf = create("", "");
        wf.max_steps = 0;
        assert_eq!(
            validate_workflow(&wf),
            vec![
                "Workflow name is required".to_string(),
                "Workflow must have at least one step".to_string(),
                "max_steps must be greater than zero".to_string(),
            ]
        );
    }

    #[test]
    fn test_validate_duplicate_ids_reported_once() {
        let mut wf = two_step_workflow();
        wf.steps[1].id = "a".into();
        wf.steps.push(wf.steps[0].clone());
        let errors = validate_workflow(&wf);
        assert_eq!(
            errors
                .iter()
                .filter(|e| e.starts_with("Duplicate step ID"))
                .count(),
            1
        );
    }

    #[test]
    fn test_validate_step_problems() {
        let mut wf = two_step_workflow();
        wf.steps[0].action = String::new();
        wf.steps[0].on_success = Some("nowhere".into());
        wf.steps[1].on_failure = Some("also-nowhere".into());
        wf.steps[1].retry_delay = -1.0;
        wf.steps[1].timeout = Some(0.0);
        wf.steps[1].error_strategy = ErrorStrategy::Fallback;

        let errors = validate_workflow(&wf);
        assert!(errors.contains(&"Step 'build': action is required".to_string()));
        assert!(errors.iter().any(|e| e.contains("on_success references unknown step 'nowhere'")));
        assert!(errors.iter().any(|e| e.contains("on_failure references unknown step 'also-nowhere'")));
        assert!(errors.iter().any(|e| e.contains("retry_delay")));
        assert!(errors.iter().any(|e| e.contains("timeout must be positive")));
        assert!(errors.iter().any(|e| e.contains("requires a fallback_action")));
    }

    #[test]
    fn test_validate_ambiguous_name() {
        let mut wf = two_step_workflow();
        wf.steps[0].name = "b".into();
        let errors = validate_workflow(&wf);
        assert_eq!(errors, vec!["Step 'b': name is also the ID of another step".to_string()]);
    }

    #[test]
    fn test_validate_step_named_after_own_id_is_fine() {
        let mut wf = two_step_workflow();
        wf.steps[0].name = "a".into();
        assert!(validate_workflow(&wf).is_empty());
    }

    #[test]
    fn test_parse_applies_record_defaults() {
        let wf = parse_workflow_json(r#"{"steps": [{"action": "echo"}]}"#).unwrap();
        assert_eq!(wf.name, "Unnamed Workflow");
        assert_eq!(wf.steps[0].name, "echo");
        assert_eq!(wf.steps[0].id.len(), 8);
        assert_eq!(wf.steps[0].max_retries, 3);
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            parse_workflow_json("{not json"),
            Err(WorkflowError::ParseError(_))
        ));
    }

    #[test]
    fn test_serialize_parse_round_trip() {
        let mut wf = two_step_workflow();
        wf.steps[0].params = json!({"z": 1, "a": "$x"}).as_object().unwrap().clone();
        wf.steps[0].condition = Some("$ready".into());
        wf.steps[1].timeout = Some(1.5);
        let text = serialize_workflow_json(&wf).unwrap();
        let back = parse_workflow_json(&text).unwrap();
        assert_eq!(back, wf);
    }
}
