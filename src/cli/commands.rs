use clap::Subcommand;

use super::config::ConfigArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Execute a suite file against its scripted page (dry run)
    Run(RunArgs),

    /// List healing strategies and the tags that map onto them
    Strategies,

    /// Inspect or validate the effective configuration
    Config(ConfigArgs),
}
