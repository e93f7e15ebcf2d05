//! Built-in action set.
//!
//! Small, dependency-free actions that make workflows runnable from the CLI
//! without any plugin wiring: `noop`, `echo`, `set`, `fail`, `sleep`, `log`.

use std::time::Duration;

use runbook_core::action::{ActionError, ActionExecutor};
use runbook_types::action::ActionOutcome;
use runbook_types::workflow::Params;
use serde_json::{Value, json};

/// Names of every built-in action, in documentation order.
pub const BUILTIN_ACTIONS: &[&str] = &["noop", "echo", "set", "fail", "sleep", "log"];

/// Upper bound for `sleep`, so a typo cannot park a run for days.
pub const MAX_SLEEP_MS: u64 = 3_600_000;

/// [`ActionExecutor`] implementing the built-in actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinActions;

impl BuiltinActions {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(action: &str) -> bool {
        BUILTIN_ACTIONS.contains(&action)
    }
}

impl ActionExecutor for BuiltinActions {
    async fn execute(&self, action: &str, params: &Params) -> Result<ActionOutcome, ActionError> {
        match action {
            "noop" => Ok(ActionOutcome::ok("ok")),
            "echo" => Ok(ActionOutcome::ok(Value::Object(params.clone()))),
            "set" => Ok(ActionOutcome::ok(
                params.get("value").cloned().unwrap_or(Value::Null),
            )),
            "fail" => {
                let message = params
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("fail action invoked");
                Ok(ActionOutcome::failed(message))
            }
            "sleep" => {
                let ms = params
                    .get("ms")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ActionError::InvalidParams {
                        action: action.to_string(),
                        message: "'ms' must be a non-negative integer".to_string(),
                    })?;
                if ms > MAX_SLEEP_MS {
                    return Err(ActionError::InvalidParams {
                        action: action.to_string(),
                        message: format!("'ms' must not exceed {MAX_SLEEP_MS}"),
                    });
                }
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ActionOutcome::ok(json!({ "slept_ms": ms })))
            }
            "log" => {
                let message = match params.get("message") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                match params.get("level").and_then(Value::as_str).unwrap_or("info") {
                    "error" => tracing::error!(action = "log", "{message}"),
                    "warn" => tracing::warn!(action = "log", "{message}"),
                    "debug" => tracing::debug!(action = "log", "{message}"),
                    _ => tracing::info!(action = "log", "{message}"),
                }
                Ok(ActionOutcome::ok(Value::String(message)))
            }
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }
}
