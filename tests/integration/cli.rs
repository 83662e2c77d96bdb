//! `updraft` command-line behavior.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn updraft() -> Command {
    let mut cmd = Command::cargo_bin("updraft").unwrap();
    cmd.env("UPDRAFT_NO_PROGRESS", "1");
    cmd
}

fn write_feed(temp: &TempDir) -> std::path::PathBuf {
    let path = temp.path().join("feed.json");
    std::fs::write(
        &path,
        r#"{
            "version": "1.2.0.0",
            "downloadUrl": "packages/app-1.2.0.0.zip",
            "changelogUrl": "https://example.com/changes",
            "mandatory": {"required": true, "minVersion": "1.1.0.0", "mode": "forced"},
            "patches": [
                {"fileName": "app-1.2.0.pwr", "version": "1.2.0.0"},
                {"fileName": "app-1.1.5.pwr", "version": "1.1.5.0"}
            ]
        }"#,
    )
    .unwrap();
    path
}

#[test]
fn test_compare_prints_ordering() {
    updraft().args(["compare", "1.0.0.0", "1.0.0.0-beta.5"]).assert().success().stdout("greater\n");
    updraft().args(["compare", "1.0", "1.0.0.0"]).assert().success().stdout("equal\n");
    updraft().args(["compare", "1.0.0.0-alpha.2", "1.0.0.0-beta.1"]).assert().success().stdout("less\n");
}

#[test]
fn test_compare_rejects_malformed_version() {
    updraft()
        .args(["compare", "1.x.0", "1.0"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid version string '1.x.0'"));
}

#[test]
fn test_check_json_report() {
    let temp = TempDir::new().unwrap();
    let feed = write_feed(&temp);

    let output = updraft()
        .args(["check", feed.to_str().unwrap(), "--installed", "1.0.0.0", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["available"], "1.2.0.0");
    assert_eq!(report["update_available"], true);
    assert_eq!(report["mandatory"], true);
    assert!(report["download_url"].as_str().unwrap().ends_with("/packages/app-1.2.0.0.zip"));
    assert_eq!(report["patches"].as_array().unwrap().len(), 2);
    assert_eq!(report["patches"][0]["version"], "1.1.5.0");
}

#[test]
fn test_check_up_to_date() {
    let temp = TempDir::new().unwrap();
    let feed = write_feed(&temp);

    updraft()
        .args(["check", feed.to_str().unwrap(), "--installed", "1.2.0.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is up to date"));
}

#[test]
fn test_install_skips_current_version() {
    let temp = TempDir::new().unwrap();
    let feed = write_feed(&temp);

    updraft()
        .env("UPDRAFT_CONFIG_PATH", temp.path().join("missing.toml"))
        .args(["install", feed.to_str().unwrap(), "--installed", "1.2.0.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is up to date"));
}
