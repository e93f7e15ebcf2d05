//! Event types for the Runbook run event bus.
//!
//! `RunEvent` is broadcast by the engine while a workflow executes.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::RunOutcome;

/// Lifecycle events emitted during a workflow run.
///
/// Subscribers (CLI progress output, logging, tests) observe these; the
/// engine never waits on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        workflow_id: String,
        workflow_name: String,
        total_steps: usize,
    },

    StepStarted {
        run_id: Uuid,
        step_id: String,
        step_name: String,
        action: String,
        /// 1-based execution counter within the run.
        sequence: u32,
    },

    /// A failed attempt will be retried after `delay_secs`.
    StepRetrying {
        run_id: Uuid,
        step_id: String,
        attempt: u32,
        error: String,
        delay_secs: f64,
    },

    StepSucceeded {
        run_id: Uuid,
        step_id: String,
        duration_ms: u64,
    },

    StepFailed {
        run_id: Uuid,
        step_id: String,
        error: String,
    },

    /// The step's guard evaluated to false.
    StepSkipped { run_id: Uuid, step_id: String },

    RunFinished {
        run_id: Uuid,
        outcome: RunOutcome,
        steps_executed: u32,
        steps_failed: u32,
        duration_ms: u64,
    },
}

impl RunEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::StepStarted { run_id, .. }
            | RunEvent::StepRetrying { run_id, .. }
            | RunEvent::StepSucceeded { run_id, .. }
            | RunEvent::StepFailed { run_id, .. }
            | RunEvent::StepSkipped { run_id, .. }
            | RunEvent::RunFinished { run_id, .. } => *run_id,
        }
    }
}
