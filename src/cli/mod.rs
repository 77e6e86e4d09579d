//! `trustrain` command line front end.
//!
//! Every engine command loads the snapshot, runs one operation as the
//! `--as` address and, when the operation mutated state and succeeded,
//! writes the snapshot back.

pub mod config;
pub mod dataset;
pub mod escrow;
pub mod offer;
pub mod output;
pub mod request;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error};

use crate::config::{default_config_dir, AppConfig};
use crate::coordinator::CoordinationEngine;
use crate::domain::Address;
use crate::persistence::SnapshotFile;
use output::OutputMode;

#[derive(Parser, Debug)]
#[command(name = "trustrain")]
#[command(about = "Coordinate compute offers, dataset listings, training requests and escrow")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub args: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments available to every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Address the command acts as.
    #[arg(long = "as", global = true, env = "TRUSTRAIN_AS", value_name = "ADDRESS")]
    pub caller: Option<String>,

    /// Output as JSON instead of human-readable tables.
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding default.toml and per-environment overrides.
    #[arg(long, global = true, env = "TRUSTRAIN_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Snapshot file to use instead of storage.snapshot_path.
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(default_config_dir)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register, list and remove resource offers
    #[command(subcommand)]
    Offer(offer::OfferCommands),

    /// Publish, list, withdraw and access datasets
    #[command(subcommand)]
    Dataset(dataset::DatasetCommands),

    /// Submit and drive training requests
    #[command(subcommand)]
    Request(request::RequestCommands),

    /// Inspect and settle escrow obligations
    #[command(subcommand)]
    Escrow(escrow::EscrowCommands),

    /// Show, initialize or validate configuration
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

impl Commands {
    /// Whether a successful run changes engine state
    pub fn is_mutating(&self) -> bool {
        match self {
            Commands::Offer(cmd) => cmd.is_mutating(),
            Commands::Dataset(cmd) => cmd.is_mutating(),
            Commands::Request(cmd) => cmd.is_mutating(),
            Commands::Escrow(cmd) => cmd.is_mutating(),
            Commands::Config(_) => false,
        }
    }
}

/// Engine plus the invocation's identity and output mode
pub struct Session {
    pub engine: CoordinationEngine,
    pub caller: Option<Address>,
    pub mode: OutputMode,
}

impl Session {
    /// The `--as` address, required by commands that act for someone
    pub fn caller(&self) -> Result<&Address> {
        self.caller
            .as_ref()
            .context("this command acts for an address; pass --as <ADDRESS> or set TRUSTRAIN_AS")
    }
}

pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let mode = OutputMode::from_json_flag(cli.args.json);

    if let Commands::Config(cmd) = cli.command {
        return cmd.run(&config, &cli.args.config_dir(), mode).await;
    }

    let snapshot_path = cli
        .args
        .snapshot
        .clone()
        .unwrap_or_else(|| config.storage.snapshot_path.clone());
    let store = SnapshotFile::new(snapshot_path);

    let engine = match store
        .load()
        .await
        .with_context(|| format!("failed to load state from {}", store.path().display()))?
    {
        Some(snapshot) => CoordinationEngine::from_snapshot(config.engine.clone(), snapshot)
            .with_context(|| format!("state in {} is inconsistent", store.path().display()))?,
        None => CoordinationEngine::new(config.engine.clone()),
    };

    let session = Session {
        engine,
        caller: cli
            .args
            .caller
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(Address::from),
        mode,
    };

    let mutating = cli.command.is_mutating();
    match cli.command {
        Commands::Offer(cmd) => offer::run(cmd, &session).await?,
        Commands::Dataset(cmd) => dataset::run(cmd, &session).await?,
        Commands::Request(cmd) => request::run(cmd, &session).await?,
        Commands::Escrow(cmd) => escrow::run(cmd, &session).await?,
        Commands::Config(_) => {}
    }

    if mutating {
        let snapshot = session.engine.snapshot().await;
        if let Err(e) = store.save(&snapshot).await {
            error!("Failed to save state to {}: {}", store.path().display(), e);
            return Err(e).context("operation succeeded but state could not be saved");
        }
    } else {
        debug!("Read-only command, snapshot left untouched");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "trustrain",
            "request",
            "accept",
            "4",
            "--amount",
            "25",
            "--as",
            "0xprovider",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.args.caller.as_deref(), Some("0xprovider"));
        assert!(cli.args.json);
        assert!(cli.command.is_mutating());
    }

    #[test]
    fn test_listing_is_read_only() {
        let cli = Cli::try_parse_from(["trustrain", "offer", "list"]).unwrap();
        assert!(!cli.command.is_mutating());
    }
}
