//! Smoke tests for the `specforge` binary.
//!
//! None of these reach a generation backend: they cover argument handling,
//! read-only commands and the errors raised before any backend is built.

use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn specforge(work_dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("specforge"));
    cmd.current_dir(work_dir.path());
    cmd.env_remove("SPECFORGE_LOG");
    cmd.stdin(Stdio::null());
    cmd
}

#[test]
fn help_lists_the_commands() {
    let temp = TempDir::new().unwrap();
    specforge(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("review"))
        .stdout(predicate::str::contains("order"));
}

#[test]
fn status_of_an_empty_directory() {
    let temp = TempDir::new().unwrap();
    specforge(&temp)
        .args(["--out", "out", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No run found"));
}

#[test]
fn status_json_is_an_object() {
    let temp = TempDir::new().unwrap();
    specforge(&temp)
        .args(["--out", "out", "status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{"));
}

#[test]
fn order_without_ready_components() {
    let temp = TempDir::new().unwrap();
    specforge(&temp)
        .args(["--out", "out", "order"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No ready components"));
}

#[test]
fn missing_specification_is_an_input_error() {
    let temp = TempDir::new().unwrap();
    specforge(&temp)
        .args(["--out", "out", "run", "does-not-exist.md"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does-not-exist.md"));
}

#[test]
fn unknown_provider_is_rejected_before_any_work() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("shop.md"), "# Shop\n").unwrap();
    specforge(&temp)
        .args(["--out", "out", "--provider", "carrier-pigeon", "run", "shop.md"])
        .assert()
        .code(2);
    assert!(!temp.path().join("out/components").exists());
}

#[test]
fn submit_requires_a_file() {
    let temp = TempDir::new().unwrap();
    specforge(&temp)
        .args(["review", "submit", "db"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}
