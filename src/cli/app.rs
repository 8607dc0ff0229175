use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{effective_config, init_logging, load_config, LoadedConfig};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.json)?;

    info!(
        "Starting healrun v{} ({} {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_DATE")
    );

    let LoadedConfig { config, path, .. } = load_config(cli.config.as_ref()).await?;
    let config = effective_config(config)?;
    let cli_context = CliContext::new(config, path, cli.output);

    match dispatch(&cli, &cli_context).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
