//! Integration tests for the `shelly` CLI binary.
//!
//! These tests cover argument parsing, help output, shell completions,
//! config handling and error exit codes without any device on the network.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `shelly` binary with env isolation.
///
/// Clears all `SHELLY_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn shelly_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("shelly");
    cmd.env("HOME", "/tmp/shelly-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/shelly-cli-test-nonexistent")
        .env_remove("SHELLY_CONFIG")
        .env_remove("SHELLY_OUTPUT")
        .env_remove("SHELLY_TIMEOUT")
        .env_remove("SHELLY_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = shelly_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    shelly_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Shelly devices")
            .and(predicate::str::contains("discover"))
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("run")),
    );
}

#[test]
fn test_version_flag() {
    shelly_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shelly"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    shelly_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_set_rejects_malformed_property() {
    shelly_cmd()
        .args(["set", "10.0.0.1", "not-a-property", "on"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not-a-property"));
}

#[test]
fn test_unknown_generation_flag_is_rejected() {
    shelly_cmd()
        .args(["status", "10.0.0.1", "--gen", "7"])
        .assert()
        .code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    shelly_cmd()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    shelly_cmd()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    // A second init without --force refuses to overwrite.
    shelly_cmd()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .code(2);

    shelly_cmd()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[connector]").and(predicate::str::contains("poll_tick_ms")));
}

#[test]
fn test_config_show_redacts_passwords() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[credentials]\npassword = \"hunter2\"\nuse_keyring = false\n",
    )
    .unwrap();

    shelly_cmd()
        .args(["config", "show", "-o", "json", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not());
}

// ── Error exit codes ────────────────────────────────────────────────

#[test]
fn test_run_without_devices_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    shelly_cmd()
        .args(["run", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no devices to manage"));
}

#[test]
fn test_unreachable_device_exits_with_connection_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[credentials]\nuse_keyring = false\n").unwrap();

    shelly_cmd()
        .args(["status", "127.0.0.1:1", "--gen", "2", "--timeout", "2", "--config"])
        .arg(&path)
        .assert()
        .code(7);
}
