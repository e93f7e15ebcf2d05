//! Step graph index.
//!
//! Steps are copied into an arena in declared order. Two side tables map
//! step IDs and step names to arena indices so branch targets can be given
//! either way. IDs take precedence over names; when several steps share a
//! name, the first declared one wins.

use std::collections::HashMap;

use runbook_types::workflow::WorkflowStep;

/// Index of a step within its `StepGraph`.
pub type StepIndex = usize;

#[derive(Debug, Clone)]
pub struct StepGraph {
    steps: Vec<WorkflowStep>,
    by_id: HashMap<String, StepIndex>,
    by_name: HashMap<String, StepIndex>,
}

impl StepGraph {
    /// Build the index from a workflow's steps. The steps are cloned, so
    /// the source definition is never touched by a run.
    pub fn build(steps: &[WorkflowStep]) -> Self {
        let mut by_id = HashMap::with_capacity(steps.len());
        let mut by_name = HashMap::with_capacity(steps.len());
        for (idx, step) in steps.iter().enumerate() {
            by_id.entry(step.id.clone()).or_insert(idx);
            if !step.name.is_empty() {
                by_name.entry(step.name.clone()).or_insert(idx);
            }
        }
        Self {
            steps: steps.to_vec(),
            by_id,
            by_name,
        }
    }

    /// Resolve a step reference by ID, then by name.
    pub fn resolve(&self, reference: &str) -> Option<StepIndex> {
        self.by_id
            .get(reference)
            .or_else(|| self.by_name.get(reference))
            .copied()
    }

    pub fn step(&self, idx: StepIndex) -> &WorkflowStep {
        &self.steps[idx]
    }

    /// Entry point: the first declared step.
    pub fn first(&self) -> Option<StepIndex> {
        if self.steps.is_empty() { None } else { Some(0) }
    }

    /// The step declared after `idx`, if any.
    pub fn next_in_order(&self, idx: StepIndex) -> Option<StepIndex> {
        let next = idx + 1;
        (next < self.steps.len()).then_some(next)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }
}
