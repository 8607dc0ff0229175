use assert_cmd::Command;

fn healrun(config_dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("healrun").unwrap();
    cmd.arg("--config")
        .arg(config_dir.path().join("config.yaml"))
        .env_remove("RUST_LOG")
        .env_remove("HEALRUN_AUTO_HEAL_THRESHOLD")
        .env_remove("HEALRUN_APPROVAL_TIMEOUT_SECS")
        .env_remove("HEALRUN_PAUSE_POLL_MS");
    cmd
}

#[test]
fn strategies_lists_the_alias_table_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = healrun(&dir)
        .args(["--output", "json", "strategies"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 6);
    assert_eq!(rows[0]["strategy"], "selector_fallback");
    assert_eq!(rows[0]["enabled"], true);
}

#[test]
fn config_reset_then_get_round_trips_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    healrun(&dir).args(["config", "reset"]).assert().success();
    assert!(dir.path().join("config.yaml").exists());

    let output = healrun(&dir)
        .args(["config", "get", "healing.auto_heal_threshold"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0.8");
}

#[test]
fn invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.yaml"),
        "healing:\n  auto_heal_threshold: 3.0\n",
    )
    .unwrap();
    healrun(&dir).args(["strategies"]).assert().failure();
}

#[test]
fn run_exit_status_follows_the_run_status() {
    let dir = tempfile::tempdir().unwrap();
    let passing = dir.path().join("passing.yaml");
    std::fs::write(
        &passing,
        "fixture:\n  elements: [\"#ok\"]\ntests:\n  - id: t\n    steps:\n      - { type: click, selector: \"#ok\" }\n",
    )
    .unwrap();
    let output = healrun(&dir).arg("run").arg(&passing).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("passed"));

    let failing = dir.path().join("failing.yaml");
    std::fs::write(
        &failing,
        "tests:\n  - id: t\n    steps:\n      - { type: click, selector: \"#missing\" }\n",
    )
    .unwrap();
    healrun(&dir).arg("run").arg(&failing).assert().failure();
}
