//! Configuration management commands
//!
//! trustrain config show     - Show the effective configuration
//! trustrain config init     - Write default.toml with default values
//! trustrain config validate - Validate the effective configuration

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;

use super::output::{self, OutputMode};
use crate::config::AppConfig;

/// Configuration-related commands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration (files + environment)
    Show {
        /// Configuration section to show (engine, storage, logging)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the effective configuration
    Validate,
}

impl ConfigCommands {
    pub async fn run(self, config: &AppConfig, config_dir: &Path, mode: OutputMode) -> Result<()> {
        match self {
            Self::Show { section } => show_config(config, section.as_deref(), mode),
            Self::Init { force } => init_config(config_dir, force, mode),
            Self::Validate => validate_config(config, mode),
        }
    }
}

fn show_config(config: &AppConfig, section: Option<&str>, mode: OutputMode) -> Result<()> {
    let value = toml::Value::try_from(config).context("Failed to render configuration")?;

    let selected = match section {
        Some(name) => value
            .get(name)
            .cloned()
            .with_context(|| format!("Unknown configuration section '{}'", name))?,
        None => value,
    };

    match mode {
        OutputMode::Json => output::print_item(&selected)?,
        OutputMode::Table => {
            let rendered = match (&selected, section) {
                (toml::Value::Table(_), Some(name)) => {
                    let mut wrapper = toml::map::Map::new();
                    wrapper.insert(name.to_string(), selected.clone());
                    toml::to_string_pretty(&wrapper)?
                }
                (toml::Value::Table(_), None) => toml::to_string_pretty(&selected)?,
                (scalar, _) => scalar.to_string(),
            };
            println!("{}", rendered);
        }
    }
    Ok(())
}

fn init_config(config_dir: &Path, force: bool, mode: OutputMode) -> Result<()> {
    let main_config = config_dir.join("default.toml");

    if main_config.exists() && !force {
        output::print_warn(&format!(
            "Configuration already exists at {}; use --force to overwrite",
            main_config.display()
        ));
        return Ok(());
    }

    std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;

    let body = toml::to_string_pretty(&AppConfig::default())
        .context("Failed to render default configuration")?;
    let content = format!(
        "# TrusTrain coordination engine configuration\n\
         # Generated by trustrain config init\n\
         # Environment overrides: TRUSTRAIN_<SECTION>__<KEY>, e.g. TRUSTRAIN_ENGINE__ESCROW_ON_DELETE\n\n{}",
        body
    );

    std::fs::write(&main_config, content).context("Failed to write default config")?;
    output::print_success(&format!("Created {}", main_config.display()), mode);
    Ok(())
}

fn validate_config(config: &AppConfig, mode: OutputMode) -> Result<()> {
    match config.validate() {
        Ok(()) => {
            output::print_success("Configuration valid", mode);
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                eprintln!("\x1b[31m✗ {}\x1b[0m", e);
            }
            anyhow::bail!("{} configuration problem(s) found", errors.len())
        }
    }
}
