//! CLI surface smoke tests. No daemon involved.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("dombridge")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("daemon"))
        .stdout(predicate::str::contains("click"))
        .stdout(predicate::str::contains("selectors"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("dombridge")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dombridge"));
}

#[test]
fn test_exec_rejects_malformed_param() {
    Command::cargo_bin("dombridge")
        .unwrap()
        .args(["exec", "click_element", "selector"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("key=value"));
}

#[test]
fn test_click_without_daemon_fails_with_hint() {
    let dir = tempfile::TempDir::new().unwrap();
    Command::cargo_bin("dombridge")
        .unwrap()
        .env("DOMBRIDGE_SOCKET", dir.path().join("absent.sock"))
        .args(["click", "#go"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("daemon start"));
}

#[test]
fn test_daemon_status_without_daemon_reports_not_running() {
    let dir = tempfile::TempDir::new().unwrap();
    Command::cargo_bin("dombridge")
        .unwrap()
        .env("DOMBRIDGE_SOCKET", dir.path().join("absent.sock"))
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}
