//! Diagnostic commands: status snapshot, identity management, config seeding.

use crate::cli::args::{IdentityAction, IdentityArgs, InitArgs, StatusArgs};
use crate::core::config::{AgentConfig, EXAMPLE_CONFIG};
use crate::core::identity::IdentityStore;
use crate::status::StatusProvider;
use anyhow::{bail, Context, Result};
use std::fs;

pub fn run_status(args: StatusArgs) -> Result<()> {
    let snapshot = StatusProvider::new().snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    println!("uptime:       {}s", snapshot.uptime_seconds);
    if let (Some(total), Some(available)) = (snapshot.total_memory_mb, snapshot.available_memory_mb)
    {
        println!("memory:       {available} MB free of {total} MB");
    }
    if let Some(cpu) = snapshot.cpu_usage_percent {
        println!("cpu:          {cpu:.1}%");
    }
    if let Some(temp) = snapshot.temperature_celsius {
        println!("temperature:  {temp:.1} C");
    }
    if let Some(storage) = snapshot.storage {
        println!(
            "storage:      {} MB free of {} MB",
            storage.available_mb, storage.total_mb
        );
    }
    println!("network:      {}", snapshot.network_type);
    println!("version:      {}", snapshot.app_version);
    Ok(())
}

pub fn run_identity(args: IdentityArgs) -> Result<()> {
    match args.action {
        IdentityAction::Show(args) => {
            let config = AgentConfig::load_or_default(&args.config)?;
            let store = IdentityStore::new(&config.resolve_data_dir());
            let identity =
                store.load_or_create(config.device_id.as_deref(), config.client_id.as_deref())?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&identity)?);
            } else {
                println!("device_id:  {}", identity.device_id);
                println!("client_id:  {}", identity.client_id);
            }
        }
        IdentityAction::Reset(args) => {
            let config = AgentConfig::load_or_default(&args.config)?;
            let store = IdentityStore::new(&config.resolve_data_dir());
            store.reset()?;
            println!("identity record removed; a new identity is generated on next start");
        }
    }
    Ok(())
}

pub fn run_init(args: InitArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        );
    }
    if let Some(parent) = args.path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config directory {}", parent.display()))?;
    }
    fs::write(&args.path, EXAMPLE_CONFIG)
        .with_context(|| format!("write {}", args.path.display()))?;
    println!("wrote starter configuration to {}", args.path.display());
    Ok(())
}
