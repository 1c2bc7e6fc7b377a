//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

/// `tabiwa` with a config path that does not exist, so defaults apply
fn tabiwa(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tabiwa").unwrap();
    cmd.arg("--config").arg(tmp.path().join("config.toml"));
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("tabiwa").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("web-search"));
}

#[test]
fn test_search_table() {
    let tmp = TempDir::new().unwrap();
    let mut cmd = tabiwa(&tmp);
    cmd.arg("search").arg("広島");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hiroshima-wide-pass"))
        .stdout(predicate::str::contains("3000円"));
}

#[test]
fn test_search_json() {
    let tmp = TempDir::new().unwrap();
    let output = tabiwa(&tmp)
        .args(["search", "岡山", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["totalCount"], 1);
    assert_eq!(json["results"][0]["id"], "okayama-kurashiki-pass");
}

#[test]
fn test_search_without_match() {
    let tmp = TempDir::new().unwrap();
    let mut cmd = tabiwa(&tmp);
    cmd.arg("search").arg("北海道");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No travel passes match"));
}

#[test]
fn test_search_uses_configured_catalog() {
    let tmp = TempDir::new().unwrap();
    let catalog = tmp.path().join("passes.json");
    std::fs::write(
        &catalog,
        r#"[{"id":"test-pass","name":"テストパス","description":"試験用","area":"四国",
            "price":1200,"validDays":1,"features":[],"url":"https://example.com/test",
            "keywords":[]}]"#,
    )
    .unwrap();
    std::fs::write(
        tmp.path().join("config.toml"),
        format!("[catalog]\npath = {:?}\n", catalog.display().to_string()),
    )
    .unwrap();

    let mut cmd = tabiwa(&tmp);
    cmd.arg("search").arg("四国");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("test-pass"));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("config.toml"), "[server]\nport = \"not a port\"\n").unwrap();

    let mut cmd = tabiwa(&tmp);
    cmd.arg("search");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_config_shows_defaults() {
    let tmp = TempDir::new().unwrap();
    let mut cmd = tabiwa(&tmp);
    cmd.arg("config");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("GEMINI_API_KEY"))
        .stdout(predicate::str::contains("[tools.web_search]"));
}
