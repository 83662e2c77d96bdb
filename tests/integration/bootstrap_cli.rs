//! `updraft-bootstrap` invoked as a process.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Command with a throwaway config so logs land inside `temp`.
fn bootstrap(temp: &TempDir) -> Command {
    let config = temp.path().join("config.toml");
    std::fs::write(&config, format!("log_dir = {:?}\n", temp.path().join("logs").display().to_string())).unwrap();

    let mut cmd = Command::cargo_bin("updraft-bootstrap").unwrap();
    cmd.env("UPDRAFT_CONFIG_PATH", &config).env("UPDRAFT_NO_PROGRESS", "1");
    cmd
}

fn log_contents(temp: &TempDir) -> String {
    std::fs::read_to_string(temp.path().join("logs").join("updraft-bootstrap.log")).unwrap_or_default()
}

#[test]
fn test_wrong_archive_suffix_exits_with_usage_code() {
    let temp = TempDir::new().unwrap();
    let update = temp.path().join("update.rar");
    std::fs::write(&update, "x").unwrap();

    bootstrap(&temp)
        .arg(&update)
        .arg(temp.path())
        .arg(temp.path().join("app"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid bootstrap arguments"));
}

#[test]
fn test_patch_mode_requires_patch_file() {
    let temp = TempDir::new().unwrap();

    bootstrap(&temp)
        .arg(temp.path().join("update.zip"))
        .arg(temp.path())
        .arg(temp.path().join("app"))
        .arg("-p")
        .assert()
        .code(2);
}

#[test]
fn test_missing_positional_is_logged_and_exits_with_usage_code() {
    let temp = TempDir::new().unwrap();
    bootstrap(&temp).arg("update.zip").assert().code(2).stderr(predicate::str::contains("Usage"));

    let log = log_contents(&temp);
    assert!(log.contains("===== updraft-bootstrap run"), "log was: {log}");
    assert!(log.contains("Invalid bootstrap arguments"), "log was: {log}");
    assert!(log.contains("required"), "log was: {log}");
}

#[test]
fn test_unknown_flag_is_logged() {
    let temp = TempDir::new().unwrap();
    bootstrap(&temp).args(["a.zip", "dir", "app", "--bogus"]).assert().code(2);

    let log = log_contents(&temp);
    assert!(log.contains("unexpected argument '--bogus'"), "log was: {log}");
}

#[test]
fn test_help_exits_cleanly() {
    let temp = TempDir::new().unwrap();
    bootstrap(&temp).arg("--help").assert().success().stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_run_header_is_appended_to_log() {
    let temp = TempDir::new().unwrap();
    for _ in 0..2 {
        bootstrap(&temp).arg("bad.txt").arg(temp.path()).arg(temp.path().join("app")).assert().code(2);
    }

    let log = log_contents(&temp);
    assert_eq!(log.matches("===== updraft-bootstrap run").count(), 2, "log was: {log}");
    assert!(log.contains("bad.txt"));
}

#[test]
fn test_corrupt_archive_exits_with_failure() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("update.zip");
    std::fs::write(&archive, "definitely not a zip").unwrap();
    let install = temp.path().join("install");

    bootstrap(&temp)
        .arg(&archive)
        .arg(&install)
        .arg(install.join("app"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid archive"));
}

#[cfg(unix)]
fn write_target(install: &Path, marker: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(install).unwrap();
    let target = install.join("app");
    std::fs::write(&target, format!("#!/bin/sh\necho \"$*\" > '{}'\n", marker.display())).unwrap();
    std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).unwrap();
    target
}

#[cfg(unix)]
#[test]
fn test_archive_is_extracted_and_target_relaunched() {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("install");
    let marker = temp.path().join("relaunched.txt");
    let target = write_target(&install, &marker);
    std::fs::write(install.join("data.txt"), "v1").unwrap();

    let archive = temp.path().join("update.zip");
    updraft::test_utils::write_zip(&archive, &[("data.txt", "v2"), ("assets/", ""), ("assets/logo.txt", "logo")])
        .unwrap();

    bootstrap(&temp)
        .arg(&archive)
        .arg(&install)
        .arg(&target)
        .args(["--", "--updated", "--from=1.0"])
        .assert()
        .success();

    assert_eq!(std::fs::read_to_string(install.join("data.txt")).unwrap(), "v2");
    assert_eq!(std::fs::read_to_string(install.join("assets").join("logo.txt")).unwrap(), "logo");

    // The relaunched target runs detached; give it a moment to write.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !marker.exists() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "--updated --from=1.0");

    let log = log_contents(&temp);
    assert!(log.contains("Extracting"), "log was: {log}");
}
