//! End-to-end tests for the runner binary.
//!
//! Spawns the binary against fake `snapraid-btrfs`/`snapper`/`snapraid`
//! scripts and verifies exit codes, the subcommands invoked and the files
//! written.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use snapraid_btrfs_runner::core::types::{RunOutcome, Step, Verdict};
use snapraid_btrfs_runner::exit_codes;
use snapraid_btrfs_runner::test_support::{FakeStep, FakeTools};

fn run_binary(config_path: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_snapraid-btrfs-runner"))
        .arg("--conf")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn runner")
}

fn write_config(tools: &FakeTools, snapraid_keys: &str, extra: &str) -> std::path::PathBuf {
    let path = tools.path().join("runner.toml");
    fs::write(&path, tools.config_toml(snapraid_keys, extra)).expect("write config");
    path
}

#[test]
fn missing_config_exits_with_config_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_binary(&temp.path().join("absent.toml"), &[]);

    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("configuration file not found"));
}

#[test]
fn invalid_config_exits_with_config_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("runner.toml");
    fs::write(&path, "[snapraid]\ndeletethreshold = \"many\"\n").expect("write config");

    let output = run_binary(&path, &[]);
    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
}

#[test]
fn successful_run_invokes_diff_then_sync() {
    let tools = FakeTools::new(&[
        FakeStep::new(Step::Diff, "add photos/new.jpg\nupdate notes.txt\n", 2),
        FakeStep::new(Step::Sync, "Everything OK\n", 0),
    ])
    .expect("fake tools");
    let config = write_config(&tools, "", "");

    let output = run_binary(&config, &[]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(tools.calls(), vec!["diff", "sync"]);
}

#[test]
fn deletions_over_threshold_abort_before_sync() {
    let removed = "remove a.dat\nremove b.dat\nremove c.dat\n";
    let tools = FakeTools::new(&[FakeStep::new(Step::Diff, removed, 2)]).expect("fake tools");
    let config = write_config(&tools, "deletethreshold = 1", "");

    let output = run_binary(&config, &[]);

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert_eq!(tools.calls(), vec!["diff"]);
}

#[test]
fn ignore_flag_syncs_despite_deletions() {
    let removed = "remove a.dat\nremove b.dat\nremove c.dat\n";
    let tools = FakeTools::new(&[FakeStep::new(Step::Diff, removed, 2)]).expect("fake tools");
    let config = write_config(&tools, "deletethreshold = 1", "");

    let output = run_binary(&config, &["--ignore-deletethreshold"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(tools.calls(), vec!["diff", "sync"]);
}

#[test]
fn failed_sync_exits_with_failure() {
    let tools = FakeTools::new(&[
        FakeStep::new(Step::Diff, "add a.dat\n", 2),
        FakeStep::new(Step::Sync, "disk full\n", 1),
    ])
    .expect("fake tools");
    let config = write_config(&tools, "", "[scrub]\nenabled = true\n");

    let output = run_binary(&config, &[]);

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert_eq!(tools.calls(), vec!["diff", "sync"]);
}

#[test]
fn missing_executable_fails_before_any_step() {
    let tools = FakeTools::new(&[]).expect("fake tools");
    let config = write_config(&tools, "", "");
    fs::remove_file(tools.snapper()).expect("remove snapper");

    let output = run_binary(&config, &[]);

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(tools.calls().is_empty());
}

#[test]
fn writes_run_report_and_log_file() {
    let tools = FakeTools::new(&[
        FakeStep::new(Step::Diff, "move old.dat -> new.dat\n", 2),
        FakeStep::new(Step::Scrub, "", 0),
    ])
    .expect("fake tools");
    let reports = tools.path().join("reports");
    let log_file = tools.path().join("logs").join("runner.log");
    let extra = format!(
        "[scrub]\nenabled = true\n\n[report]\ndir = '{}'\n\n[logging]\nfile = '{}'\n",
        reports.display(),
        log_file.display()
    );
    let config = write_config(&tools, "", &extra);

    let output = run_binary(&config, &["--no-scrub"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(tools.calls(), vec!["diff", "sync"]);

    let run_dirs: Vec<_> = fs::read_dir(&reports)
        .expect("read reports dir")
        .map(|entry| entry.expect("dir entry").path())
        .collect();
    assert_eq!(run_dirs.len(), 1);

    let outcome_json = fs::read_to_string(run_dirs[0].join("outcome.json")).expect("read outcome");
    let outcome: RunOutcome = serde_json::from_str(&outcome_json).expect("parse outcome");
    assert_eq!(outcome.verdict, Verdict::Success);
    assert_eq!(outcome.steps(), vec![Step::Diff, Step::Sync]);
    assert_eq!(outcome.diff.map(|d| d.moved), Some(1));

    let transcript =
        fs::read_to_string(run_dirs[0].join("transcript.log")).expect("read transcript");
    assert!(transcript.starts_with("Subject: [SnapRAID] Status Report: SUCCESS"));
    assert!(transcript.contains("move old.dat -> new.dat"));

    let log = fs::read_to_string(&log_file).expect("read log file");
    assert!(log.contains("Run started"));
    assert!(log.contains("Run finished successfully"));
}
