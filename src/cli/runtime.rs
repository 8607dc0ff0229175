use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

pub const LOCAL_CONFIG_PATH: &str = "config/healrun.yaml";

/// Install the global subscriber. Logs go to stderr so that stdout only
/// carries command output.
pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    /// False when no file existed and defaults were used
    pub from_file: bool,
}

/// Where configuration is read from when `--config` is not given
pub fn default_config_path() -> Result<PathBuf> {
    // Priority: ./config/healrun.yaml > <config_dir>/healrun/config.yaml
    let local_config = PathBuf::from(LOCAL_CONFIG_PATH);
    if local_config.exists() {
        return Ok(local_config);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("healrun");
    path.push("config.yaml");
    Ok(path)
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    match read_config_file(&config_path).await? {
        Some(config) => {
            info!("Loaded configuration from: {}", config_path.display());
            Ok(LoadedConfig {
                config,
                path: config_path,
                from_file: true,
            })
        }
        None => {
            warn!(
                "Config file not found, using defaults: {}",
                config_path.display()
            );
            Ok(LoadedConfig {
                config: Config::default(),
                path: config_path,
                from_file: false,
            })
        }
    }
}

/// Parse the file at `path`; `None` when it does not exist
pub async fn read_config_file(path: &Path) -> Result<Option<Config>> {
    if !fs::try_exists(path).await? {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let config = if raw.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    };
    Ok(Some(config))
}

/// Environment overrides on top of the file, then validation
pub fn effective_config(mut config: Config) -> Result<Config> {
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;
    Ok(config)
}
