//! Runbook CLI entry point.
//!
//! Binary name: `rbk`
//!
//! Parses CLI arguments, sets up tracing, opens the workflow store, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,runbook=debug",
        _ => "trace",
    };

    runbook_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "rbk", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;

    let result = dispatch(cli, &state).await;
    runbook_observe::tracing_setup::shutdown_tracing();
    result
}

async fn dispatch(cli: Cli, state: &AppState) -> anyhow::Result<()> {
    let json = cli.json;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Create { name, description } => {
            cli::workflow::create_workflow(state, &name, &description, json).await?;
        }

        Commands::AddStep(args) => {
            cli::workflow::add_step(state, args, json).await?;
        }

        Commands::RemoveStep { workflow, step } => {
            cli::workflow::remove_step(state, &workflow, &step, json).await?;
        }

        Commands::Connect {
            workflow,
            from,
            to,
            on,
        } => {
            cli::workflow::connect_steps(state, &workflow, &from, &to, on, json).await?;
        }

        Commands::Validate { workflow } => {
            cli::workflow::validate(state, &workflow, json).await?;
        }

        Commands::Show { workflow } => {
            cli::workflow::show_workflow(state, &workflow, json).await?;
        }

        Commands::List => {
            cli::workflow::list_workflows(state, json).await?;
        }

        Commands::Delete { workflow } => {
            cli::workflow::delete_workflow(state, &workflow, json).await?;
        }

        Commands::Import { file, force } => {
            cli::workflow::import_workflow(state, &file, force, json).await?;
        }

        Commands::Export { workflow, output } => {
            cli::workflow::export_workflow(state, &workflow, output.as_deref()).await?;
        }

        Commands::Run {
            workflow,
            var,
            vars,
        } => {
            cli::run::run_workflow(state, &workflow, &var, vars.as_deref(), json, quiet).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
