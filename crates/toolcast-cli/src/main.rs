//! `toolcast` -- CLI binary for the toolcast tool-event layer.
//!
//! Provides the following subcommands:
//!
//! - `toolcast validate` -- Check a stream of newline-delimited envelopes.
//! - `toolcast emit` -- Build one envelope and POST it to the fallback endpoint.
//! - `toolcast config` -- Show the resolved configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

/// toolcast tool-event CLI.
#[derive(Debug, Parser)]
#[command(name = "toolcast", about = "toolcast tool-event CLI", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate newline-delimited envelopes from a file or stdin.
    Validate(commands::validate::ValidateArgs),

    /// Send one envelope over the fallback path.
    Emit(commands::emit::EmitArgs),

    /// Show the resolved configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Validate(args) => commands::validate::run(args)?,
        Commands::Emit(args) => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::emit::run(args, &config).await?;
        }
        Commands::Config => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::config_cmd::config_show(&config)?;
        }
    }

    Ok(())
}
