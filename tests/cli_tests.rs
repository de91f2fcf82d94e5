//! Integration tests for the perfgate binary
//!
//! Each test records a competition into a replay file and runs the CLI
//! against a limits directory in a temp dir.

use assert_cmd::Command;
use perfgate::analysis::{competition_lock_path, PARALLEL_RUN_SKIPPED};
use predicates::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

mod utils;
use utils::{write_limits, write_replay, STORED_RATIO};

fn perfgate() -> Command {
    Command::cargo_bin("perfgate").unwrap()
}

#[test]
fn test_adjust_and_persist_records_limits() {
    let dir = tempfile::tempdir().unwrap();
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);

    perfgate()
        .arg("--adjust")
        .arg("--persist")
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&replay)
        .assert()
        .success()
        .stdout(predicate::str::contains("Competition 'Bar' PASSED"));

    let written = fs::read_to_string(dir.path().join("limits.json")).unwrap();
    assert!(written.contains("\"TimeRatio\""));
    assert!(written.contains("\"Time\""));
    assert!(written.contains("\"Unit\""));

    // Recorded limits hold on the next check-only run
    perfgate()
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&replay)
        .assert()
        .success()
        .stdout(predicate::str::contains("All limits ok."));
}

#[test]
fn test_check_only_fails_on_missing_limits() {
    let dir = tempfile::tempdir().unwrap();
    write_limits(dir.path(), "limits.json", STORED_RATIO);
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);

    perfgate()
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&replay)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Competition 'Bar' FAILED"))
        .stdout(predicate::str::contains("has no stored limits"));
}

#[test]
fn test_missing_resource_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let replay = write_replay(dir.path(), "bar.replay.json", Some("absent.json"), 1);

    perfgate()
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&replay)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Competition 'Bar' ERROR"))
        .stdout(predicate::str::contains("Could not load limits"));
}

#[test]
fn test_default_limits_flag() {
    let dir = tempfile::tempdir().unwrap();
    let replay = write_replay(dir.path(), "bar.replay.json", None, 1);

    perfgate()
        .args(["--adjust", "--persist", "--limits", "default.json"])
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&replay)
        .assert()
        .success();

    assert!(dir.path().join("default.json").is_file());
}

#[test]
fn test_toml_backend() {
    let dir = tempfile::tempdir().unwrap();
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.toml"), 1);

    perfgate()
        .args(["--format", "toml", "--adjust", "--persist"])
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&replay)
        .assert()
        .success();

    let written = fs::read_to_string(dir.path().join("limits.toml")).unwrap();
    assert!(written.contains("[[competitions]]"));
    assert!(written.contains("type = \"Bar\""));
}

#[test]
fn test_quiet_prints_verdict_line_only() {
    let dir = tempfile::tempdir().unwrap();
    write_limits(dir.path(), "limits.json", STORED_RATIO);
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);

    let output = perfgate()
        .arg("--quiet")
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&replay)
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "stdout:\n{}", stdout);
    assert!(stdout.contains("FAILED"));
}

#[test]
fn test_config_file_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("perfgate.toml");
    fs::write(
        &config,
        format!(
            "adjust_limits = true\npersist_limits = true\nbase_directory = {:?}\n",
            dir.path().display().to_string()
        ),
    )
    .unwrap();
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);

    perfgate()
        .arg("--config")
        .arg(&config)
        .arg(&replay)
        .assert()
        .success();
    assert!(dir.path().join("limits.json").is_file());
}

#[test]
fn test_invalid_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("perfgate.toml");
    fs::write(&config, "max_attempts = \"many\"\n").unwrap();
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);

    perfgate()
        .arg("--config")
        .arg(&config)
        .arg(&replay)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_unreadable_replay() {
    perfgate()
        .arg("/nonexistent/bar.replay.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_parallel_competitions_with_fail_policy() {
    let dir = tempfile::tempdir().unwrap();
    write_limits(dir.path(), "limits.json", STORED_RATIO);
    let first = write_replay(dir.path(), "one.replay.json", Some("limits.json"), 1);
    let second = write_replay(dir.path(), "two.replay.json", Some("limits.json"), 1);

    // Whatever the interleaving, both competitions report a verdict
    let output = perfgate()
        .args(["--parallel", "--concurrency", "fail", "--quiet"])
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&first)
        .arg(&second)
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 2, "stdout:\n{}", stdout);
    assert!(!output.status.success());
}

/// Take the lock of `competition_id` the way another perfgate process would
fn hold_competition(lock_dir: &Path, competition_id: &str) -> File {
    fs::create_dir_all(lock_dir).unwrap();
    let file = File::create(competition_lock_path(lock_dir, competition_id)).unwrap();
    file.try_lock().unwrap();
    file
}

#[test]
fn test_fail_policy_skips_competition_locked_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let locks = dir.path().join("locks");
    write_limits(dir.path(), "limits.json", STORED_RATIO);
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);
    let _held = hold_competition(&locks, "Bar");

    perfgate()
        .args(["--concurrency", "fail", "--lock-dir"])
        .arg(&locks)
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&replay)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Competition 'Bar' SKIPPED"))
        .stdout(predicate::str::contains(PARALLEL_RUN_SKIPPED));
}

#[test]
fn test_lock_policy_waits_for_competition_locked_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let locks = dir.path().join("locks");
    let replay = write_replay(dir.path(), "bar.replay.json", Some("limits.json"), 1);
    let held = hold_competition(&locks, "Bar");

    let started = Instant::now();
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        drop(held);
    });

    perfgate()
        .args(["--adjust", "--persist", "--concurrency", "lock", "--lock-dir"])
        .arg(&locks)
        .arg("--base-dir")
        .arg(dir.path())
        .arg(&replay)
        .assert()
        .success()
        .stdout(predicate::str::contains("Competition 'Bar' PASSED"));

    releaser.join().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(dir.path().join("limits.json").is_file());
}

#[test]
fn test_help() {
    perfgate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--concurrency"));
}
