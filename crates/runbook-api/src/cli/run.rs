//! `rbk run`: execute a stored workflow with the built-in actions.
//!
//! Progress comes from the engine's event bus and goes to stderr, so
//! `--json` output on stdout stays machine-readable. Ctrl+C asks the engine
//! to stop; the run then finishes with outcome `stopped`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio::sync::broadcast;

use runbook_core::event::bus::EventBus;
use runbook_core::workflow::executor::WorkflowEngine;
use runbook_infra::actions::BuiltinActions;
use runbook_types::event::RunEvent;
use runbook_types::workflow::{Params, RunOutcome, StepStatus, WorkflowResult};

use super::workflow::{load_workflow, parse_json_object};
use crate::state::AppState;

/// Parse one `--var key=value` argument.
///
/// The value is read as JSON when it parses (`3`, `true`, `{"a":1}`), else
/// kept as a plain string.
pub(crate) fn parse_var(raw: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid --var '{raw}': expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid --var '{raw}': key is empty");
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Merge `--vars` (applied first) and `--var` entries into the initial context.
pub(crate) fn build_variables(vars: &[String], vars_json: Option<&str>) -> Result<Params> {
    let mut variables = match vars_json {
        Some(raw) => parse_json_object(raw, "--vars")?,
        None => Params::new(),
    };
    for raw in vars {
        let (key, value) = parse_var(raw)?;
        variables.insert(key, value);
    }
    Ok(variables)
}

pub async fn run_workflow(
    state: &AppState,
    workflow: &str,
    vars: &[String],
    vars_json: Option<&str>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let wf = load_workflow(state, workflow).await?;
    let variables = build_variables(vars, vars_json).context("Invalid run variables")?;

    let engine = Arc::new(
        WorkflowEngine::new(BuiltinActions::new())
            .with_event_bus(EventBus::new(state.config.event_capacity))
            .with_default_timeout(state.config.default_step_timeout_secs),
    );

    let progress = if json || quiet {
        None
    } else {
        Some(tokio::spawn(print_progress(engine.event_bus().subscribe())))
    };

    let stopper = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("  {} Stopping after the current step...", style("!").yellow().bold());
                engine.stop();
            }
        })
    };

    let result = engine.execute(&wf, variables).await;
    stopper.abort();
    if let Some(handle) = progress {
        // The printer exits on RunFinished, which a rejected run never sends.
        if result.outcome == RunOutcome::Rejected {
            handle.abort();
        } else {
            let _ = handle.await;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !quiet {
        print_summary(&wf.name, &result);
    }

    if !result.success {
        bail!("Workflow '{}' {}", wf.name, result.outcome);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

async fn print_progress(mut rx: broadcast::Receiver<RunEvent>) {
    let mut names: HashMap<String, String> = HashMap::new();

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "progress printer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            RunEvent::RunStarted {
                workflow_name,
                total_steps,
                ..
            } => {
                eprintln!();
                eprintln!(
                    "  {} Running '{}' ({} steps)",
                    style(">").cyan().bold(),
                    style(workflow_name).cyan(),
                    total_steps
                );
            }
            RunEvent::StepStarted {
                step_id,
                step_name,
                action,
                sequence,
                ..
            } => {
                eprintln!(
                    "  {} {} {}",
                    style(format!("[{sequence}]")).dim(),
                    step_name,
                    style(format!("({action})")).dim()
                );
                names.insert(step_id, step_name);
            }
            RunEvent::StepRetrying {
                attempt,
                error,
                delay_secs,
                ..
            } => {
                eprintln!(
                    "      {} attempt {attempt} failed: {error} (retrying in {delay_secs}s)",
                    style("↻").yellow()
                );
            }
            RunEvent::StepSucceeded {
                step_id,
                duration_ms,
                ..
            } => {
                let label = names.get(&step_id).map(String::as_str).unwrap_or(&step_id);
                eprintln!(
                    "      {} {label} {}",
                    style("✓").green(),
                    style(format!("{duration_ms}ms")).dim()
                );
            }
            RunEvent::StepFailed { step_id, error, .. } => {
                let label = names.get(&step_id).map(String::as_str).unwrap_or(&step_id);
                eprintln!("      {} {label}: {error}", style("✗").red());
            }
            RunEvent::StepSkipped { step_id, .. } => {
                eprintln!(
                    "  {} {} {}",
                    style("-").dim(),
                    step_id,
                    style("(skipped: condition false)").dim()
                );
            }
            RunEvent::RunFinished { .. } => break,
        }
    }
}

fn status_cell(status: StepStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        StepStatus::Success => cell.fg(Color::Green),
        StepStatus::Failed => cell.fg(Color::Red),
        StepStatus::Skipped => cell.fg(Color::DarkGrey),
        _ => cell.fg(Color::Yellow),
    }
}

fn print_summary(name: &str, result: &WorkflowResult) {
    println!();
    let marker = if result.success {
        style("✓").green().bold()
    } else {
        style("✗").red().bold()
    };
    println!(
        "  {} '{}' {} in {}ms",
        marker,
        style(name).cyan(),
        result.outcome,
        result.duration_ms
    );
    println!(
        "  {} executed, {} failed",
        style(result.steps_executed).bold(),
        style(result.steps_failed).bold()
    );

    if !result.steps.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Status"),
                Cell::new("Attempts"),
                Cell::new("Result / Error"),
            ]);
        for step in &result.steps {
            let detail = match (&step.error, &step.result) {
                (Some(err), _) => err.clone(),
                (None, Some(value)) => value.to_string(),
                (None, None) => String::new(),
            };
            table.add_row(vec![
                Cell::new(&step.name),
                status_cell(step.status),
                Cell::new(step.attempts),
                Cell::new(detail),
            ]);
        }
        println!("{table}");
    }

    if !result.errors.is_empty() {
        println!("  {}", style("Errors:").bold());
        for err in &result.errors {
            println!("    {} {}", style("•").dim(), err);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_var_json_value() {
        assert_eq!(parse_var("count=3").unwrap(), ("count".to_string(), json!(3)));
        assert_eq!(parse_var("on=true").unwrap().1, json!(true));
        assert_eq!(parse_var(r#"cfg={"a":1}"#).unwrap().1, json!({"a": 1}));
    }

    #[test]
    fn test_parse_var_plain_string() {
        assert_eq!(parse_var("name=alice").unwrap().1, json!("alice"));
        assert_eq!(parse_var("expr=a=b").unwrap().1, json!("a=b"));
        assert_eq!(parse_var("empty=").unwrap().1, json!(""));
    }

    #[test]
    fn test_parse_var_rejects_missing_key() {
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=3").is_err());
    }

    #[test]
    fn test_build_variables_var_overrides_vars() {
        let vars = vec!["mode=fast".to_string()];
        let merged = build_variables(&vars, Some(r#"{"mode": "slow", "n": 2}"#)).unwrap();
        assert_eq!(merged["mode"], "fast");
        assert_eq!(merged["n"], 2);
    }
}
