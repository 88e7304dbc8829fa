//! Real child-process tests for the output-capturing runner.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use plan_reviewer::core::run::RunRequest;
use plan_reviewer::io::process::{CommandRunner, ProcessRunner, SpawnError};

fn request(dir: &Path, command: &str, args: &[&str], timeout_secs: u64) -> RunRequest {
    RunRequest {
        command: command.to_string(),
        args: args.iter().map(|arg| arg.to_string()).collect(),
        env: BTreeMap::new(),
        workdir: dir.to_path_buf(),
        timeout: Duration::from_secs(timeout_secs),
        output_file: dir.join("out").join("capture.txt"),
        preview_limit: 1_000,
    }
}

#[test]
fn captures_both_streams_into_one_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(
        temp.path(),
        "sh",
        &["-c", "echo to-stdout; echo to-stderr >&2; exit 3"],
        10,
    );

    let result = ProcessRunner.run(&req).expect("run");
    assert_eq!(result.exit_code, 3);
    assert!(!result.timed_out);
    assert!(result.signal.is_empty());
    assert!(result.preview.contains("to-stdout"));
    assert!(result.preview.contains("to-stderr"));

    let captured = fs::read_to_string(&req.output_file).expect("capture");
    assert!(captured.contains("to-stdout"));
    assert!(captured.contains("to-stderr"));
    assert_eq!(result.output_bytes, captured.len() as u64);
}

#[test]
fn exports_env_and_runs_in_workdir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut req = request(temp.path(), "sh", &["-c", "echo \"$HOME\"; pwd"], 10);
    req.env.insert("HOME".to_string(), "/custom/home".to_string());

    let result = ProcessRunner.run(&req).expect("run");
    assert_eq!(result.exit_code, 0);
    assert!(result.preview.contains("/custom/home"));
    let dir_name = temp
        .path()
        .file_name()
        .expect("name")
        .to_string_lossy()
        .into_owned();
    assert!(result.preview.contains(&dir_name));
}

#[test]
fn timeout_without_output_terminates_child() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(temp.path(), "sleep", &["30"], 1);

    let start = Instant::now();
    let result = ProcessRunner.run(&req).expect("run");
    assert!(result.timed_out);
    assert!(!result.has_output());
    assert_eq!(result.signal, "SIGTERM");
    assert_eq!(result.exit_code, -1);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn child_ignoring_terminate_is_killed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(
        temp.path(),
        "sh",
        &["-c", "trap '' TERM; echo partial; exec sleep 30"],
        1,
    );

    let start = Instant::now();
    let result = ProcessRunner.run(&req).expect("run");
    assert!(result.timed_out);
    assert!(result.has_output());
    assert_eq!(result.signal, "SIGKILL");
    assert!(result.preview.contains("partial"));
    assert!(start.elapsed() < Duration::from_secs(15));
}

#[test]
fn preview_is_bounded_but_file_is_complete() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut req = request(
        temp.path(),
        "sh",
        &["-c", "i=0; while [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done"],
        30,
    );
    req.preview_limit = 20;

    let result = ProcessRunner.run(&req).expect("run");
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.preview.chars().count(), 20);
    assert!(result.preview.ends_with("line-1999\n"));

    let captured = fs::read_to_string(&req.output_file).expect("capture");
    assert!(captured.starts_with("line-0\n"));
    assert_eq!(captured.lines().count(), 2000);
}

#[test]
fn missing_command_is_spawn_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(temp.path(), "definitely-not-a-real-reviewer-cli", &[], 5);

    let err = ProcessRunner.run(&req).unwrap_err();
    let spawn = err.downcast_ref::<SpawnError>().expect("spawn error");
    assert!(spawn.is_not_found());
    assert_eq!(spawn.command, "definitely-not-a-real-reviewer-cli");
}

#[test]
fn background_helper_holding_pipe_does_not_stall_return() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(temp.path(), "sh", &["-c", "sleep 30 & echo started"], 10);

    let start = Instant::now();
    let result = ProcessRunner.run(&req).expect("run");
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(!result.timed_out);
    assert_eq!(result.exit_code, 0);
    assert!(result.preview.contains("started"));
}

#[test]
fn timed_out_child_with_background_helper_returns_within_grace() {
    let temp = tempfile::tempdir().expect("tempdir");
    let req = request(
        temp.path(),
        "sh",
        &["-c", "sleep 30 & echo started; sleep 30"],
        1,
    );

    let start = Instant::now();
    let result = ProcessRunner.run(&req).expect("run");
    assert!(start.elapsed() < Duration::from_secs(15));
    assert!(result.timed_out);
    assert!(result.preview.contains("started"));
}
