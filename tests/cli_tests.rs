//! Integration tests for the CLI interface

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_cli_help_flag() {
    let mut cmd = Command::cargo_bin("teaflow").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--step-latency"));
}

#[test]
fn test_runs_all_scenarios() {
    let mut cmd = Command::cargo_bin("teaflow").unwrap();
    cmd.args(["--step-latency", "10ms"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stirs:2"));
}

#[test]
fn test_json_report() {
    let mut cmd = Command::cargo_bin("teaflow").unwrap();
    cmd.args(["--step-latency", "10ms", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"assembly_attempts\": 2"));
}

#[test]
fn test_unavailable_milk_exits_non_zero() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("teaflow.toml");
    fs::write(
        &config_path,
        "step_latency = \"10ms\"\nunavailable = [\"milk\"]\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("teaflow").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("durables-and-heating-in-flight"));
}

#[test]
fn test_invalid_step_latency() {
    let mut cmd = Command::cargo_bin("teaflow").unwrap();
    cmd.args(["--step-latency", "soon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
