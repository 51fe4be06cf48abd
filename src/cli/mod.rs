//! Beacon CLI - unified command-line interface.
//!
//! Provides a single binary entry point for:
//! - `beacon run` - Run the agent
//! - `beacon status` - Print one device status snapshot
//! - `beacon identity` - Show or reset the persisted device identity
//! - `beacon init` - Write a commented starter configuration file

mod args;
pub mod commands;

pub use args::{Cli, Commands, IdentityAction, IdentityArgs, InitArgs, RunArgs, StatusArgs};
