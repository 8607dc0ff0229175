use std::env;
use std::path::PathBuf;

use healrun_cli::cli::runtime::{effective_config, load_config};
use healrun_cli::config::{ENV_APPROVAL_TIMEOUT_SECS, ENV_AUTO_HEAL_THRESHOLD, ENV_PAUSE_POLL_MS};
use healrun_cli::{Config, ConfigError};
use serial_test::serial;

fn clear_overrides() {
    for key in [
        ENV_AUTO_HEAL_THRESHOLD,
        ENV_APPROVAL_TIMEOUT_SECS,
        ENV_PAUSE_POLL_MS,
    ] {
        env::remove_var(key);
    }
}

#[tokio::test]
async fn explicit_path_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("healrun.yaml");
    std::fs::write(
        &path,
        "healing:\n  auto_heal_threshold: 0.9\n  projects:\n    shop:\n      enabled_strategies: [id]\nevents:\n  bus_capacity: 32\n",
    )
    .unwrap();

    let loaded = load_config(Some(&path)).await.unwrap();
    assert!(loaded.from_file);
    assert_eq!(loaded.path, path);
    assert_eq!(loaded.config.healing.auto_heal_threshold, 0.9);
    assert_eq!(loaded.config.events.bus_capacity, 32);
    assert!(loaded.config.healing.projects.contains_key("shop"));
    assert_eq!(loaded.config.execution.pause_poll_ms, 1000);
}

#[tokio::test]
async fn missing_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("absent.yaml");
    let loaded = load_config(Some(&path)).await.unwrap();
    assert!(!loaded.from_file);
    assert_eq!(loaded.config, Config::default());
}

#[tokio::test]
async fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "healing: [not, a, map]\n").unwrap();
    let err = load_config(Some(&path)).await.err().unwrap();
    assert!(format!("{err:#}").contains("parsing"));
}

#[test]
#[serial]
fn environment_overrides_win_over_the_file() {
    clear_overrides();
    env::set_var(ENV_AUTO_HEAL_THRESHOLD, "0.55");
    env::set_var(ENV_APPROVAL_TIMEOUT_SECS, "12");
    env::set_var(ENV_PAUSE_POLL_MS, "250");

    let config = effective_config(Config::default()).unwrap();
    clear_overrides();

    assert_eq!(config.healing.auto_heal_threshold, 0.55);
    assert_eq!(config.healing.approval_timeout_secs, 12);
    assert_eq!(config.execution.pause_poll_ms, 250);
    assert_eq!(
        config.healing.approval_config().default_timeout.as_secs(),
        12
    );
}

#[test]
#[serial]
fn invalid_environment_values_are_ignored() {
    clear_overrides();
    env::set_var(ENV_AUTO_HEAL_THRESHOLD, "2.0");
    env::set_var(ENV_PAUSE_POLL_MS, "fast");

    let config = effective_config(Config::default()).unwrap();
    clear_overrides();

    assert_eq!(config.healing.auto_heal_threshold, 0.8);
    assert_eq!(config.execution.pause_poll_ms, 1000);
}

#[test]
#[serial]
fn invalid_file_values_fail_validation() {
    clear_overrides();
    let mut config = Config::default();
    config.execution.pause_poll_ms = 0;
    let err = effective_config(config).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::ZeroPausePoll)
    );
}
