//! dirsync node agent
//!
//! Keeps a local directory replica in step with one or more dirsync servers.
//!
//! # Commands
//!
//! - `run` - Identify with every configured server and sync until stopped
//! - `identity` - Print the node identity, creating it if necessary
//! - `version` - Show version information

mod client;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// dirsync node agent.
#[derive(Parser)]
#[command(name = "dirsync-node")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify with every configured server and sync until stopped
    Run {
        /// Path to the JSON node configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Per-request timeout (e.g. "30s", "1m")
        #[arg(long, default_value = "30s", value_parser = parse_timeout)]
        request_timeout: Duration,
    },

    /// Print the node identity, creating it if necessary
    Identity {
        /// Path to the identity file
        #[arg(short, long, default_value = "node_id.json")]
        path: PathBuf,
    },

    /// Show version information
    Version,
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    dirsync_node::parse_duration(value).map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            config,
            request_timeout,
        } => {
            commands::run::run(&config, request_timeout)?;
        }
        Commands::Identity { path } => {
            commands::identity::run(&path)?;
        }
        Commands::Version => {
            println!("dirsync-node v{}", env!("CARGO_PKG_VERSION"));
            println!("dirsync API v{}", dirsync_protocol::version::API_VERSION);
        }
    }

    Ok(())
}
