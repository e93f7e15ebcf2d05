//! CLI workflow definition subcommands.
//!
//! Provides create, add-step, remove-step, connect, validate, show, list,
//! delete, import and export over the JSON workflow store.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use runbook_core::repository::workflow::WorkflowRepository;
use runbook_core::workflow::definition::{
    self, StepOptions, parse_workflow_json, serialize_workflow_json, validate_workflow,
};
use runbook_types::workflow::{ConnectOn, Params, Workflow, WorkflowStep};

use super::AddStepArgs;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load a workflow by ID or name, failing when it does not exist.
pub(crate) async fn load_workflow(state: &AppState, key: &str) -> Result<Workflow> {
    state
        .store
        .load(key)
        .await
        .with_context(|| format!("Failed to load workflow '{key}'"))?
        .with_context(|| format!("Workflow '{key}' not found"))
}

/// Parse a `--params` / `--vars` argument. Must be a JSON object.
pub(crate) fn parse_json_object(raw: &str, flag: &str) -> Result<Params> {
    let value: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("Invalid JSON for {flag}"))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("{flag} must be a JSON object, got: {other}"),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_problems(errors: &[String]) {
    for err in errors {
        println!("    {} {}", style("!").yellow().bold(), err);
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

pub async fn create_workflow(
    state: &AppState,
    name: &str,
    description: &str,
    json: bool,
) -> Result<()> {
    let mut wf = definition::create(name, description);
    state
        .store
        .save(&mut wf)
        .await
        .context("Failed to save workflow")?;

    if json {
        return print_json(&wf);
    }

    println!();
    println!(
        "  {} Created workflow '{}'",
        style("✓").green().bold(),
        style(&wf.name).cyan()
    );
    println!("  {} {}", style("ID:").bold(), style(&wf.id).dim());
    println!(
        "  Add steps with: {}",
        style(format!("rbk add-step {} <name> <action>", wf.id)).yellow()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

pub async fn add_step(state: &AppState, args: AddStepArgs, json: bool) -> Result<()> {
    let mut wf = load_workflow(state, &args.workflow).await?;

    let params = match args.params.as_deref() {
        Some(raw) => parse_json_object(raw, "--params")?,
        None => Params::new(),
    };

    if let Some(id) = args.id.as_deref() {
        if wf.steps.iter().any(|s| s.id == id) {
            bail!("Step ID '{id}' already exists in workflow '{}'", wf.name);
        }
    }

    let options = StepOptions {
        id: args.id,
        on_success: args.on_success,
        on_failure: args.on_failure,
        condition: args.condition,
        error_strategy: args.strategy,
        max_retries: args.max_retries,
        retry_delay: args.retry_delay,
        fallback_action: args.fallback,
        timeout: args.timeout,
    };
    let step = definition::add_step(&mut wf, &args.name, &args.action, params, options).clone();

    state
        .store
        .save(&mut wf)
        .await
        .context("Failed to save workflow")?;

    if json {
        return print_json(&step);
    }

    println!();
    println!(
        "  {} Added step '{}' ({}) to '{}'",
        style("✓").green().bold(),
        style(&step.name).cyan(),
        style(&step.id).dim(),
        wf.name
    );
    let errors = validate_workflow(&wf);
    if !errors.is_empty() {
        println!("  Workflow is not valid yet:");
        print_problems(&errors);
    }
    println!();

    Ok(())
}

pub async fn remove_step(state: &AppState, workflow: &str, step_id: &str, json: bool) -> Result<()> {
    let mut wf = load_workflow(state, workflow).await?;

    if !definition::remove_step(&mut wf, step_id) {
        bail!("Step '{step_id}' not found in workflow '{}'", wf.name);
    }
    state
        .store
        .save(&mut wf)
        .await
        .context("Failed to save workflow")?;

    let dangling = validate_workflow(&wf);
    if json {
        return print_json(&serde_json::json!({
            "removed": step_id,
            "workflow_id": wf.id,
            "errors": dangling,
        }));
    }

    println!();
    println!(
        "  {} Removed step '{}' from '{}'",
        style("✓").green().bold(),
        step_id,
        style(&wf.name).cyan()
    );
    if !dangling.is_empty() {
        print_problems(&dangling);
    }
    println!();

    Ok(())
}

pub async fn connect_steps(
    state: &AppState,
    workflow: &str,
    from: &str,
    to: &str,
    on: ConnectOn,
    json: bool,
) -> Result<()> {
    let mut wf = load_workflow(state, workflow).await?;

    if !definition::connect(&mut wf, from, to, on) {
        bail!("Step '{from}' not found in workflow '{}'", wf.name);
    }
    if wf.find_step(to).is_none() {
        tracing::warn!(workflow = %wf.name, target_step = to, "connected to a step that does not exist");
    }

    state
        .store
        .save(&mut wf)
        .await
        .context("Failed to save workflow")?;

    if json {
        return print_json(&serde_json::json!({
            "workflow_id": wf.id,
            "from": from,
            "to": to,
            "on": on.to_string(),
        }));
    }

    println!();
    println!(
        "  {} {} --{}--> {}",
        style("✓").green().bold(),
        style(from).cyan(),
        on,
        style(to).cyan()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Validate / Show / List
// ---------------------------------------------------------------------------

pub async fn validate(state: &AppState, workflow: &str, json: bool) -> Result<()> {
    let wf = load_workflow(state, workflow).await?;
    let errors = validate_workflow(&wf);

    if json {
        print_json(&serde_json::json!({
            "id": wf.id,
            "valid": errors.is_empty(),
            "errors": errors,
        }))?;
    } else if errors.is_empty() {
        println!();
        println!(
            "  {} Workflow '{}' is valid",
            style("✓").green().bold(),
            style(&wf.name).cyan()
        );
        println!();
    } else {
        println!();
        println!(
            "  {} Workflow '{}' has {} problem(s):",
            style("✗").red().bold(),
            style(&wf.name).cyan(),
            errors.len()
        );
        print_problems(&errors);
        println!();
    }

    if !errors.is_empty() {
        bail!("Validation failed");
    }
    Ok(())
}

fn branch_label(target: Option<&str>) -> String {
    target.map(str::to_string).unwrap_or_else(|| "-".to_string())
}

fn strategy_label(step: &WorkflowStep) -> String {
    use runbook_types::workflow::ErrorStrategy;
    match step.error_strategy {
        ErrorStrategy::Retry => format!("retry x{}", step.max_retries),
        ErrorStrategy::Fallback => format!(
            "fallback ({})",
            step.fallback_action.as_deref().unwrap_or("?")
        ),
        other => other.to_string(),
    }
}

pub async fn show_workflow(state: &AppState, workflow: &str, json: bool) -> Result<()> {
    let wf = load_workflow(state, workflow).await?;

    if json {
        return print_json(&wf);
    }

    println!();
    println!("  {}", style(&wf.name).cyan().bold());
    if !wf.description.is_empty() {
        println!("  {}", style(&wf.description).dim());
    }
    println!();
    println!("  {} {}", style("ID:").bold(), style(&wf.id).dim());
    println!("  {} {}", style("Stop on error:").bold(), wf.stop_on_error);
    println!("  {} {}", style("Max steps:").bold(), wf.max_steps);
    println!(
        "  {} {}",
        style("Updated:").bold(),
        wf.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if wf.steps.is_empty() {
        println!("  No steps yet.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Action"),
            Cell::new("On error"),
            Cell::new("On success"),
            Cell::new("On failure"),
            Cell::new("Condition"),
        ]);

    for (i, step) in wf.steps.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&step.id),
            Cell::new(&step.name),
            Cell::new(&step.action),
            Cell::new(strategy_label(step)),
            Cell::new(branch_label(step.on_success.as_deref())),
            Cell::new(branch_label(step.on_failure.as_deref())),
            Cell::new(step.condition.as_deref().unwrap_or("")),
        ]);
    }

    println!("{table}");
    println!();

    Ok(())
}

pub async fn list_workflows(state: &AppState, json: bool) -> Result<()> {
    let summaries = state
        .store
        .list()
        .await
        .context("Failed to list workflows")?;

    if json {
        return print_json(&summaries);
    }

    if summaries.is_empty() {
        println!();
        println!(
            "  {} No workflows in {}",
            style("i").blue().bold(),
            style(state.store.dir().display()).dim()
        );
        println!(
            "  Create one with: {}",
            style("rbk create <name>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("ID"),
            Cell::new("Steps"),
            Cell::new("Description"),
        ]);

    for s in &summaries {
        table.add_row(vec![
            Cell::new(&s.name),
            Cell::new(&s.id),
            Cell::new(s.steps),
            Cell::new(&s.description),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  {} workflow(s) in {}",
        style(summaries.len()).bold(),
        style(state.data_dir.display()).dim()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Delete / Import / Export
// ---------------------------------------------------------------------------

pub async fn delete_workflow(state: &AppState, workflow: &str, json: bool) -> Result<()> {
    let wf = load_workflow(state, workflow).await?;
    let removed = state
        .store
        .delete(&wf.id)
        .await
        .context("Failed to delete workflow")?;

    if json {
        return print_json(&serde_json::json!({ "id": wf.id, "deleted": removed }));
    }

    println!();
    println!(
        "  {} Deleted workflow '{}'",
        style("✓").green().bold(),
        style(&wf.name).cyan()
    );
    println!();

    Ok(())
}

pub async fn import_workflow(state: &AppState, file: &Path, force: bool, json: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut wf = parse_workflow_json(&text)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", file.display()))?;

    let existing = state
        .store
        .load(&wf.id)
        .await
        .context("Failed to check for an existing workflow")?;
    if existing.is_some_and(|e| e.id == wf.id) && !force {
        bail!(
            "Workflow '{}' already exists. Use --force to replace it.",
            wf.id
        );
    }

    state
        .store
        .save_validated(&mut wf)
        .await
        .map_err(|e| anyhow::anyhow!("Workflow not imported: {e}"))?;

    if json {
        return print_json(&wf.summary());
    }

    println!();
    println!(
        "  {} Imported workflow '{}' ({} steps)",
        style("✓").green().bold(),
        style(&wf.name).cyan(),
        wf.steps.len()
    );
    println!("  {} {}", style("ID:").bold(), style(&wf.id).dim());
    println!();

    Ok(())
}

pub async fn export_workflow(state: &AppState, workflow: &str, output: Option<&Path>) -> Result<()> {
    let wf = load_workflow(state, workflow).await?;
    let text = serialize_workflow_json(&wf).map_err(|e| anyhow::anyhow!("{e}"))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, format!("{text}\n"))
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "  {} Exported '{}' to {}",
                style("✓").green().bold(),
                wf.name,
                path.display()
            );
        }
        None => println!("{text}"),
    }

    Ok(())
}
