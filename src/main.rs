//! Beacon - unified CLI entrypoint.
//!
//! Usage:
//!   beacon run --config config/beacon.toml
//!   beacon status [--json]
//!   beacon identity show
//!   beacon init --path config/beacon.toml

use anyhow::Result;
use beacon::cli::commands::{run_agent, run_identity, run_init, run_status};
use beacon::cli::{Cli, Commands};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_agent(args).await,
        Commands::Status(args) => run_status(args),
        Commands::Identity(args) => run_identity(args),
        Commands::Init(args) => run_init(args),
    }
}
