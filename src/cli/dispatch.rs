use anyhow::Result;

use super::config::cmd_config;
use super::context::CliContext;
use super::env::CliArgs;
use super::run::cmd_run;
use super::strategies::cmd_strategies;
use crate::cli::commands::Commands;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Strategies => cmd_strategies(ctx),
        Commands::Config(args) => cmd_config(args, ctx).await,
    }
}
