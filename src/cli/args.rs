//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Beacon - MQTT device agent for remotely managed displays.
#[derive(Parser)]
#[command(name = "beacon")]
#[command(version)]
#[command(about = "Beacon device connectivity and content delivery agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent
    Run(RunArgs),

    /// Print one device status snapshot
    Status(StatusArgs),

    /// Show or reset the persisted device identity
    Identity(IdentityArgs),

    /// Write a commented starter configuration file
    Init(InitArgs),
}

// -----------------------------------------------------------------------------
// Run command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/beacon.toml")]
    pub config: PathBuf,
}

// -----------------------------------------------------------------------------
// Status command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct StatusArgs {
    /// Emit JSON instead of table output
    #[arg(long)]
    pub json: bool,
}

// -----------------------------------------------------------------------------
// Identity command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub action: IdentityAction,
}

#[derive(Subcommand)]
pub enum IdentityAction {
    /// Print the device identity, generating and persisting it if absent
    Show(IdentityShowArgs),
    /// Delete the persisted identity record
    Reset(IdentityResetArgs),
}

#[derive(Args)]
pub struct IdentityShowArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/beacon.toml")]
    pub config: PathBuf,

    /// Emit JSON instead of table output
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct IdentityResetArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/beacon.toml")]
    pub config: PathBuf,
}

// -----------------------------------------------------------------------------
// Init command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Where to write the configuration file
    #[arg(long, default_value = "config/beacon.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
