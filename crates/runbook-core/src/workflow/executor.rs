//! Workflow engine: sequential step traversal with retry, fallback and
//! branch routing.
//!
//! # Execution flow
//!
//! 1. Acquire the engine's run guard (one run at a time; later callers are
//!    rejected, not queued).
//! 2. Copy the workflow's steps into a `StepGraph` and start at the first
//!    declared step.
//! 3. For each step: check for a stop request, check the step budget,
//!    evaluate the guard, run the action with retries and fallback, then
//!    follow the success or failure link.
//! 4. Build a `WorkflowResult` recording why the run ended.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use runbook_types::event::RunEvent;
use runbook_types::workflow::{
    ErrorStrategy, Params, RunOutcome, StepReport, StepStatus, Workflow, WorkflowResult,
    WorkflowStep,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::action::ActionExecutor;
use crate::event::bus::EventBus;

use super::context::RunContext;
use super::expression::evaluate_condition;
use super::graph::{StepGraph, StepIndex};
use super::retry::RetryHandler;
use super::substitute::substitute_params;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub const MSG_ALREADY_RUNNING: &str = "Another workflow is running";
pub const MSG_STOPPED: &str = "Workflow stopped by user";
pub const MSG_ACTION_FAILED: &str = "Action failed";

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Mutable per-step state for one run. Lives beside the `StepGraph` arena so
/// definitions are never written to.
#[derive(Debug, Clone, Default)]
struct StepState {
    status: StepStatus,
    attempts: u32,
    result: Option<Value>,
    error: Option<String>,
}

/// Result of running one step's attempt loop.
enum StepRun {
    Succeeded(Value),
    Failed(String),
}

/// Releases the engine's run slot on every exit path.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    cancel: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut slot = match self.cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
        self.running.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Executes workflows against an injected `ActionExecutor`.
///
/// One engine runs one workflow at a time. Construct separate engines for
/// concurrent runs.
pub struct WorkflowEngine<A: ActionExecutor> {
    executor: A,
    event_bus: EventBus,
    default_timeout: Option<Duration>,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl<A: ActionExecutor> WorkflowEngine<A> {
    pub fn new(executor: A) -> Self {
        Self {
            executor,
            event_bus: EventBus::default(),
            default_timeout: None,
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    /// Publish run events on `bus` instead of a private one.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = bus;
        self
    }

    /// Timeout for steps that declare none. Non-positive values disable it.
    pub fn with_default_timeout(mut self, secs: Option<f64>) -> Self {
        self.default_timeout = secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok());
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn executor(&self) -> &A {
        &self.executor
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request that the active run stop.
    ///
    /// Observed before each step and during retry waits. An action call in
    /// flight is allowed to finish. Returns `false` when nothing is running.
    pub fn stop(&self) -> bool {
        let slot = match self.cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_ref() {
            Some(token) => {
                token.cancel();
                tracing::info!("stop requested for active workflow run");
                true
            }
            None => false,
        }
    }

    fn acquire(&self) -> Option<(RunGuard<'_>, CancellationToken)> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let token = CancellationToken::new();
        {
            let mut slot = match self.cancel.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = Some(token.clone());
        }
        let guard = RunGuard {
            running: &self.running,
            cancel: &self.cancel,
        };
        Some((guard, token))
    }

    /// Run `workflow` to completion with `variables` as the initial context.
    ///
    /// Step failures never escape: they are recorded in the returned
    /// `WorkflowResult`, whose `outcome` says why the run ended.
    pub async fn execute(&self, workflow: &Workflow, variables: Params) -> WorkflowResult {
        let Some((_guard, cancel)) = self.acquire() else {
            tracing::warn!(
                workflow = workflow.name.as_str(),
                "rejecting run: another workflow is running"
            );
            return WorkflowResult::rejected(MSG_ALREADY_RUNNING);
        };

        let run_id = Uuid::now_v7();
        let started = Instant::now();
        let graph = StepGraph::build(&workflow.steps);
        let mut states = vec![StepState::default(); graph.len()];
        let mut context = RunContext::new(variables);
        let mut results = serde_json::Map::new();
        let mut errors: Vec<String> = Vec::new();
        let mut steps_executed: u32 = 0;
        let mut steps_failed: u32 = 0;
        let mut outcome: Option<RunOutcome> = None;
        let mut current = graph.first();

        self.event_bus.publish(RunEvent::RunStarted {
            run_id,
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            total_steps: graph.len(),
        });
        tracing::info!(
            run_id = %run_id,
            workflow = workflow.name.as_str(),
            steps = graph.len(),
            "starting workflow execution"
        );

        while let Some(idx) = current {
            if steps_executed >= workflow.max_steps {
                errors.push(format!("Step limit reached ({})", workflow.max_steps));
                outcome = Some(RunOutcome::StepLimitReached);
                break;
            }
            if cancel.is_cancelled() {
                errors.push(MSG_STOPPED.to_string());
                outcome = Some(RunOutcome::Stopped);
                break;
            }

            steps_executed += 1;
            let step = graph.step(idx);
            let state = &mut states[idx];
            state.status = StepStatus::Running;
            self.event_bus.publish(RunEvent::StepStarted {
                run_id,
                step_id: step.id.clone(),
                step_name: step.name.clone(),
                action: step.action.clone(),
                sequence: steps_executed,
            });

            if let Some(condition) = step.condition.as_deref() {
                if !evaluate_condition(condition, &context) {
                    tracing::debug!(run_id = %run_id, step_id = step.id.as_str(), "condition false, skipping step");
                    state.status = StepStatus::Skipped;
                    self.event_bus.publish(RunEvent::StepSkipped {
                        run_id,
                        step_id: step.id.clone(),
                    });
                    current = self.next_on_success(&graph, idx);
                    continue;
                }
            }

            tracing::debug!(
                run_id = %run_id,
                step_id = step.id.as_str(),
                action = step.action.as_str(),
                "executing step"
            );
            let step_started = Instant::now();
            let step_span = tracing::info_span!(
                "step",
                run_id = %run_id,
                step_id = step.id.as_str(),
                action = step.action.as_str()
            );
            match self
                .run_step(run_id, step, state, &context, &cancel)
                .instrument(step_span)
                .await
            {
                StepRun::Succeeded(output) => {
                    state.status = StepStatus::Success;
                    state.result = Some(output.clone());
                    results.insert(step.id.clone(), output.clone());
                    context.insert(step.name.clone(), output);
                    self.event_bus.publish(RunEvent::StepSucceeded {
                        run_id,
                        step_id: step.id.clone(),
                        duration_ms: step_started.elapsed().as_millis() as u64,
                    });
                    current = self.next_on_success(&graph, idx);
                }
                StepRun::Failed(error) => {
                    steps_failed += 1;
                    state.status = StepStatus::Failed;
                    state.error = Some(error.clone());
                    errors.push(format!("{}: {}", step.name, error));
                    self.event_bus.publish(RunEvent::StepFailed {
                        run_id,
                        step_id: step.id.clone(),
                        error: error.clone(),
                    });
                    tracing::warn!(
                        run_id = %run_id,
                        step_id = step.id.as_str(),
                        error = error.as_str(),
                        "step failed"
                    );

                    if cancel.is_cancelled() {
                        errors.push(MSG_STOPPED.to_string());
                        outcome = Some(RunOutcome::Stopped);
                        break;
                    }
                    if workflow.stop_on_error && step.error_strategy == ErrorStrategy::Stop {
                        outcome = Some(RunOutcome::Aborted {
                            step_id: step.id.clone(),
                        });
                        break;
                    }
                    match self.next_on_failure(&graph, idx) {
                        Some(next) => current = Some(next),
                        None => {
                            outcome = Some(RunOutcome::Halted {
                                step_id: step.id.clone(),
                            });
                            break;
                        }
                    }
                }
            }
        }

        let outcome = outcome.unwrap_or(if steps_failed == 0 {
            RunOutcome::Completed
        } else {
            RunOutcome::CompletedWithFailures
        });
        let duration_ms = started.elapsed().as_millis() as u64;

        self.event_bus.publish(RunEvent::RunFinished {
            run_id,
            outcome: outcome.clone(),
            steps_executed,
            steps_failed,
            duration_ms,
        });
        tracing::info!(
            run_id = %run_id,
            workflow = workflow.name.as_str(),
            outcome = %outcome,
            steps_executed,
            steps_failed,
            duration_ms,
            "workflow execution finished"
        );

        let steps = graph
            .steps()
            .iter()
            .zip(states)
            .map(|(step, state)| StepReport {
                id: step.id.clone(),
                name: step.name.clone(),
                status: state.status,
                attempts: state.attempts,
                result: state.result,
                error: state.error,
            })
            .collect();

        WorkflowResult {
            success: steps_failed == 0,
            outcome,
            steps_executed,
            steps_failed,
            duration_ms,
            results,
            errors,
            steps,
        }
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Follow `on_success`, or the next declared step when unset.
    fn next_on_success(&self, graph: &StepGraph, idx: StepIndex) -> Option<StepIndex> {
        match graph.step(idx).on_success.as_deref() {
            Some(target) => self.resolve_link(graph, idx, target),
            None => graph.next_in_order(idx),
        }
    }

    /// Follow `on_failure`. A failure with no link has no route, whatever the
    /// step's error strategy.
    fn next_on_failure(&self, graph: &StepGraph, idx: StepIndex) -> Option<StepIndex> {
        let target = graph.step(idx).on_failure.as_deref()?;
        self.resolve_link(graph, idx, target)
    }

    fn resolve_link(&self, graph: &StepGraph, idx: StepIndex, target: &str) -> Option<StepIndex> {
        let resolved = graph.resolve(target);
        if resolved.is_none() {
            tracing::warn!(
                step_id = graph.step(idx).id.as_str(),
                branch = target,
                "branch target does not resolve to a step"
            );
        }
        resolved
    }

    // -----------------------------------------------------------------------
    // Step execution
    // -----------------------------------------------------------------------

    /// Attempt loop for one step: retries under the `retry` strategy, then
    /// one fallback call under the `fallback` strategy.
    async fn run_step(
        &self,
        run_id: Uuid,
        step: &WorkflowStep,
        state: &mut StepState,
        context: &RunContext,
        cancel: &CancellationToken,
    ) -> StepRun {
        let timeout = RetryHandler::attempt_timeout(step, self.default_timeout);
        let mut retries: u32 = 0;

        let last_error = loop {
            let params = substitute_params(&step.params, context);
            state.attempts += 1;
            let error = match self.invoke(&step.action, &params, timeout).await {
                Ok(output) => return StepRun::Succeeded(output),
                Err(error) => error,
            };
            tracing::debug!(
                run_id = %run_id,
                step_id = step.id.as_str(),
                attempt = state.attempts,
                error = error.as_str(),
                "step attempt failed"
            );

            retries += 1;
            if !RetryHandler::should_retry(step, retries) {
                break error;
            }

            let delay = RetryHandler::delay(step);
            state.status = StepStatus::Retrying;
            self.event_bus.publish(RunEvent::StepRetrying {
                run_id,
                step_id: step.id.clone(),
                attempt: state.attempts,
                error: error.clone(),
                delay_secs: delay.as_secs_f64(),
            });
            if !RetryHandler::wait(delay, cancel).await {
                tracing::debug!(run_id = %run_id, step_id = step.id.as_str(), "retry wait cancelled");
                break error;
            }
            state.status = StepStatus::Running;
        };

        if let Some(fallback) = RetryHandler::fallback_action(step) {
            if !cancel.is_cancelled() {
                state.attempts += 1;
                match self.invoke(fallback, &Params::new(), timeout).await {
                    Ok(output) => {
                        tracing::info!(
                            run_id = %run_id,
                            step_id = step.id.as_str(),
                            fallback,
                            "fallback action succeeded"
                        );
                        return StepRun::Succeeded(output);
                    }
                    Err(error) => {
                        tracing::warn!(
                            run_id = %run_id,
                            step_id = step.id.as_str(),
                            fallback,
                            error = error.as_str(),
                            "fallback action failed"
                        );
                    }
                }
            }
        }

        StepRun::Failed(last_error)
    }

    /// One executor call, bounded by `timeout`. Every failure mode is
    /// flattened to an error message.
    async fn invoke(
        &self,
        action: &str,
        params: &Params,
        timeout: Option<Duration>,
    ) -> Result<Value, String> {
        let call = self.executor.execute(action, params);
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => return Err(format!("timed out after {}s", limit.as_secs_f64())),
            },
            None => call.await,
        };
        match result {
            Ok(outcome) if outcome.success => Ok(outcome.output),
            Ok(outcome) => Err(outcome
                .error
                .unwrap_or_else(|| MSG_ACTION_FAILED.to_string())),
            Err(e) => Err(e.to_string()),
        }
    }
}

impl<A: ActionExecutor> std::fmt::Debug for WorkflowEngine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("running", &self.is_running())
            .field("default_timeout", &self.default_timeout)
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
