//! Smoke tests of the `harvest` binary's argument and configuration handling.
//!
//! None of these reach the point of launching Chrome.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

const ENV_VARS: [&str; 8] = [
    "RUST_LOG",
    "HARVEST_CONFIG",
    "HARVEST_USERNAME",
    "HARVEST_PASSWORD",
    "HARVEST_BASE_URL",
    "APP_USERNAME",
    "APP_PASSWORD",
    "BASE_URL",
];

/// The binary, run inside `dir` with no harvest variables inherited.
fn harvest_cmd(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("harvest").expect("harvest binary should be built");
    cmd.current_dir(dir);
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_flags() {
    let tmp = tempfile::tempdir().unwrap();
    harvest_cmd(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--force-login"))
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--headless"));
}

#[test]
fn missing_config_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    harvest_cmd(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration from harvest.toml"));
}

#[test]
fn config_without_credentials_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("site.toml"),
        r##"
base_url = "https://app.example.com"

[selectors.login]
username = "#user"
password = "#pass"
submit = "#submit"
success_indicator = "#dashboard"
"##,
    )
    .unwrap();

    harvest_cmd(tmp.path())
        .args(["--config", "site.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("credentials.username"));
}

#[test]
fn dotenv_supplies_config_path() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(".env"), "HARVEST_CONFIG=from-dotenv.toml\n").unwrap();

    harvest_cmd(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("from-dotenv.toml"));
}

#[test]
fn dotenv_sets_log_filter() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join(".env"), "RUST_LOG=debug\n").unwrap();

    harvest_cmd(tmp.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("reading configuration"));
}

#[test]
fn malformed_config_reports_parse_error() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("harvest.toml"), "base_url = [").unwrap();

    harvest_cmd(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config file"));
}
