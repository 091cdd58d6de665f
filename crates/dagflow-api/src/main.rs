//! dagflow CLI entry point.
//!
//! Binary name: `dagflow`
//!
//! Parses CLI arguments, loads `config.toml` from the data directory, installs
//! tracing, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use dagflow_infra::config::{load_engine_config, resolve_data_dir};
use dagflow_observe::tracing_setup::{directive_for_verbosity, init_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need config or tracing
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "dagflow", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(resolve_data_dir);
    let config = load_engine_config(&data_dir).await;

    init_tracing(
        config.log_format,
        directive_for_verbosity(cli.verbose, cli.quiet),
    )
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
    tracing::debug!(data_dir = %data_dir.display(), "configuration loaded");

    let state = AppState::init(data_dir, config)?;

    match cli.command {
        Commands::Run {
            file,
            payload,
            run_id,
        } => {
            let failed = cli::workflow::handle_run(
                &state,
                &file,
                payload.as_deref(),
                run_id,
                cli.json,
                cli.quiet,
            )
            .await?;
            if failed {
                std::process::exit(1);
            }
        }

        Commands::Validate { file } => {
            cli::workflow::handle_validate(&state, &file, cli.json)?;
        }

        Commands::Plan { file } => {
            cli::workflow::handle_plan(&file, cli.json)?;
        }

        Commands::Types => {
            cli::types::list_types(&state, cli.json)?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
