//! CLI command definitions for the `dagflow` binary.

pub mod types;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run and inspect DAG workflows.
#[derive(Parser)]
#[command(name = "dagflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding config.toml and the file_store root.
    #[arg(long, global = true, env = "DAGFLOW_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow file and print each node's outcome.
    Run {
        /// Path to a YAML or JSON workflow file.
        file: PathBuf,

        /// JSON object whose keys are seeded into the run's results.
        #[arg(long)]
        payload: Option<String>,

        /// Use this run id instead of a generated one.
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Check a workflow file without running it.
    Validate {
        /// Path to a YAML or JSON workflow file.
        file: PathBuf,
    },

    /// Show the static wave layout of a workflow.
    Plan {
        /// Path to a YAML or JSON workflow file.
        file: PathBuf,
    },

    /// List registered node types.
    Types,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
