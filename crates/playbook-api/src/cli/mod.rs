//! CLI command definitions for the `playbook` binary.

pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run incident-response playbooks.
#[derive(Parser)]
#[command(name = "playbook", version, about, long_about = None)]
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

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "PLAYBOOK_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a playbook file (YAML or JSON) and print its summary.
    Run {
        /// Path to the playbook file.
        file: PathBuf,

        /// Override the actor recorded as executing the run.
        #[arg(long)]
        executed_by: Option<String>,

        /// Extra context as a JSON object, merged over the file's context.
        #[arg(long)]
        context: Option<String>,
    },

    /// Check a playbook file without running it.
    Validate {
        /// Path to the playbook file.
        file: PathBuf,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
