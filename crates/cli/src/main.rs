//! Pagemind CLI — the main entry point.
//!
//! Commands:
//! - `run`    — Drive the cognition loop against the configured endpoint
//! - `status` — Show memory statistics and window usage
//! - `memory` — Inspect the persisted memory files
//!
//! Exit codes: `0` success, `1` config error, `2` persistence error,
//! `3` endpoint error, `4` directive parse error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use pagemind_core::Error;

mod commands;

#[derive(Parser)]
#[command(
    name = "pagemind",
    about = "Pagemind — an autonomous agent runtime with tiered paged memory",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the agent config file (TOML or JSON)
    #[arg(short, long, global = true, default_value = "pagemind.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent loop until cancelled
    Run {
        /// Stop after this many steps (default: run until Ctrl-C)
        #[arg(long)]
        max_steps: Option<u64>,
    },

    /// Show memory statistics and context-window usage
    Status,

    /// Inspect the persisted memory files
    Memory {
        #[command(subcommand)]
        action: commands::memory::MemoryAction,
    },
}

/// The documented exit code for an error kind.
fn exit_code_for(err: &Error) -> u8 {
    match err {
        Error::Config { .. } => 1,
        Error::Persistence(_) => 2,
        Error::Store(_) | Error::Directory(_) | Error::InvariantViolation(_) => 2,
        Error::Provider(_) => 3,
        Error::Directive(_) | Error::Value(_) => 4,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run { max_steps } => commands::run::run(&cli.config, max_steps).await,
        Commands::Status => commands::status::run(&cli.config),
        Commands::Memory { action } => commands::memory::run(&cli.config, action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}
