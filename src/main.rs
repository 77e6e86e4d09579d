use anyhow::Context;
use clap::Parser;
use trustrain::cli::{self, Cli};
use trustrain::config::AppConfig;

mod main_runtime;

use main_runtime::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.args.config_dir();
    let config = AppConfig::load_from(&config_dir).with_context(|| {
        format!("Failed to load configuration from {}", config_dir.display())
    })?;

    let _log_guard = init_logging(&config.logging);

    cli::run(cli, config).await
}
