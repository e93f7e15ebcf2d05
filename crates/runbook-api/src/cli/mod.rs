//! CLI command definitions for the `rbk` binary.
//!
//! Uses clap derive macros for argument parsing. Every workflow argument
//! accepts either a workflow ID or a workflow name.

pub mod run;
pub mod workflow;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use runbook_types::workflow::{ConnectOn, ErrorStrategy};

/// Build, store and run multi-step workflows.
#[derive(Parser)]
#[command(name = "rbk", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "RUNBOOK_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty workflow.
    Create {
        /// Workflow name.
        name: String,

        /// Free-form description.
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Append a step to a workflow.
    #[command(name = "add-step")]
    AddStep(AddStepArgs),

    /// Remove a step (by ID) from a workflow.
    #[command(name = "remove-step")]
    RemoveStep {
        /// Workflow ID or name.
        workflow: String,

        /// Step ID.
        step: String,
    },

    /// Link one step to another on success or failure.
    Connect {
        /// Workflow ID or name.
        workflow: String,

        /// Source step ID or name.
        from: String,

        /// Target step ID or name.
        to: String,

        /// Which branch to set: success or failure.
        #[arg(long, default_value = "success")]
        on: ConnectOn,
    },

    /// Check a workflow for structural problems.
    Validate {
        /// Workflow ID or name.
        workflow: String,
    },

    /// Show a workflow and its steps.
    Show {
        /// Workflow ID or name.
        workflow: String,
    },

    /// List stored workflows.
    #[command(alias = "ls")]
    List,

    /// Delete a stored workflow.
    #[command(alias = "rm")]
    Delete {
        /// Workflow ID or name.
        workflow: String,
    },

    /// Import a workflow from a JSON file.
    Import {
        /// Path to the workflow JSON document.
        file: PathBuf,

        /// Replace an existing workflow with the same ID.
        #[arg(long)]
        force: bool,
    },

    /// Write a workflow's JSON document to a file or stdout.
    Export {
        /// Workflow ID or name.
        workflow: String,

        /// Output path (stdout when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a workflow with the built-in actions.
    Run {
        /// Workflow ID or name.
        workflow: String,

        /// Initial variable as key=value (value parsed as JSON, else a string).
        #[arg(long = "var", value_name = "KEY=VALUE")]
        var: Vec<String>,

        /// Initial variables as a JSON object.
        #[arg(long)]
        vars: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Arguments for `rbk add-step`.
#[derive(Args)]
pub struct AddStepArgs {
    /// Workflow ID or name.
    pub workflow: String,

    /// Step name.
    pub name: String,

    /// Action the step invokes.
    pub action: String,

    /// Step parameters as a JSON object.
    #[arg(long)]
    pub params: Option<String>,

    /// Explicit step ID (generated when omitted).
    #[arg(long)]
    pub id: Option<String>,

    /// Step to run after success.
    #[arg(long)]
    pub on_success: Option<String>,

    /// Step to run after failure.
    #[arg(long)]
    pub on_failure: Option<String>,

    /// Guard condition; the step is skipped when it evaluates false.
    #[arg(long)]
    pub condition: Option<String>,

    /// Error strategy: stop, retry, skip or fallback.
    #[arg(long)]
    pub strategy: Option<ErrorStrategy>,

    /// Retry budget for the retry strategy.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Seconds to wait between retries.
    #[arg(long)]
    pub retry_delay: Option<f64>,

    /// Action run once when the step fails under the fallback strategy.
    #[arg(long)]
    pub fallback: Option<String>,

    /// Per-attempt timeout in seconds.
    #[arg(long)]
    pub timeout: Option<f64>,
}
