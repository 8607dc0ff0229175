use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value as JsonValue;
use tokio::fs;
use tracing::info;

use super::context::CliContext;
use super::runtime::read_config_file;
use crate::config::Config;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file, defaults and environment)
    Show,

    /// Get one configuration value by dotted key, e.g. `healing.auto_heal_threshold`
    Get {
        /// Configuration key
        key: String,
    },

    /// Print the configuration file path in use
    Path,

    /// Validate the configuration file
    Validate,

    /// Write the default configuration to the configuration file path
    Reset,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let path = ctx.config_path().to_path_buf();
    match args.action {
        ConfigAction::Show => match ctx.output().render(ctx.config())? {
            Some(rendered) => println!("{rendered}"),
            None => {
                println!("Effective configuration ({}):", path.display());
                println!("{}", serde_yaml::to_string(ctx.config())?);
            }
        },
        ConfigAction::Get { key } => {
            let json = serde_json::to_value(ctx.config())?;
            let segments = split_key(&key)?;
            match get_json_value(&json, &segments) {
                Some(value) => println!("{}", serde_yaml::to_string(value)?.trim_end()),
                None => bail!("{} not found in configuration", key),
            }
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Validate => match read_config_file(&path).await? {
            Some(config) => {
                config
                    .validate()
                    .with_context(|| format!("validating {}", path.display()))?;
                println!("Configuration file {} is valid", path.display());
            }
            None => println!(
                "No configuration file at {}; defaults are valid",
                path.display()
            ),
        },
        ConfigAction::Reset => {
            save_config_file(&path, &Config::default()).await?;
            info!("Configuration reset at {}", path.display());
            println!(
                "Configuration reset to defaults and written to {}",
                path.display()
            );
        }
    }

    Ok(())
}

async fn save_config_file(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let serialized = serde_yaml::to_string(config)?;
    fs::write(path, serialized)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn split_key(key: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = key
        .split('.')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        bail!("configuration key cannot be empty");
    }
    Ok(segments)
}

fn get_json_value<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut current = value;
    for segment in path {
        match current {
            JsonValue::Object(map) => {
                current = map.get(*segment)?;
            }
            _ => return None,
        }
    }
    Some(current)
}
