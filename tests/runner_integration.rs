//! Runner behaviour against shell-script stand-ins for the encoder.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::kill;
use nix::unistd::Pid;
use rust_slideshow::command::EncoderCommand;
use rust_slideshow::error::Error;
use rust_slideshow::events::{JobFailure, JobOutcome};
use rust_slideshow::settings::{JobConfiguration, RawSettings, validate_with};
use rust_slideshow::tasks::runner::{JobRunner, RunnerState, TERMINATE_GRACE, terminate_child};
use tempfile::{TempDir, tempdir};

fn write_stub(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn job_config(dir: &Path) -> JobConfiguration {
    let raw = RawSettings {
        output: Some(dir.join("out.webm")),
        ..RawSettings::default()
    };
    validate_with(&raw, &[dir.join("a.png")], |_| Ok((64, 48))).unwrap()
}

fn command_for(dir: &TempDir, body: &str) -> EncoderCommand {
    named_command(dir, "fake-ffmpeg", body)
}

fn named_command(dir: &TempDir, name: &str, body: &str) -> EncoderCommand {
    let stub = write_stub(dir.path(), name, body);
    EncoderCommand::build(&stub, &job_config(dir.path()), &dir.path().join("script.txt"))
}

/// Poll until the job settles, collecting every progress line seen.
fn run_to_completion(runner: &mut JobRunner) -> (Vec<String>, JobOutcome) {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut progress = Vec::new();
    loop {
        let poll = runner.poll();
        progress.extend(poll.progress);
        if let Some(outcome) = poll.outcome {
            return (progress, outcome);
        }
        assert!(Instant::now() < deadline, "job did not finish in time");
        thread::sleep(Duration::from_millis(20));
    }
}

fn wait_for_pid(runner: &JobRunner) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(pid) = runner.child_pid() {
            return pid;
        }
        assert!(Instant::now() < deadline, "encoder never spawned");
        thread::sleep(Duration::from_millis(10));
    }
}

fn alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[test]
fn successful_exit_reports_output() {
    let dir = tempdir().unwrap();
    let mut runner = JobRunner::new();
    runner
        .start(command_for(&dir, "echo 'ffmpeg version test' >&2\nexit 0"))
        .unwrap();
    let (_, outcome) = run_to_completion(&mut runner);
    assert_eq!(
        outcome,
        JobOutcome::Succeeded {
            output: dir.path().join("out.webm")
        }
    );
    assert_eq!(runner.state(), RunnerState::Idle);
}

#[test]
fn failure_carries_exit_code_and_tail() {
    let dir = tempdir().unwrap();
    let body = "printf 'frame=    1 fps=0.0\\r' >&2\n\
                printf 'frame=    2 fps=0.0\\r' >&2\n\
                echo boom >&2\n\
                exit 1";
    let mut runner = JobRunner::new();
    runner.start(command_for(&dir, body)).unwrap();
    let (progress, outcome) = run_to_completion(&mut runner);

    assert_eq!(progress.last().map(String::as_str), Some("frame=    2 fps=0.0"));
    let JobOutcome::Failed(failure) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    match &failure {
        JobFailure::Exit { code, tail, .. } => {
            assert_eq!(*code, Some(1));
            assert_eq!(tail.last().map(String::as_str), Some("boom"));
        }
        other => panic!("unexpected failure kind: {other:?}"),
    }
    let text = failure.to_string();
    assert!(text.contains("Return Code: 1"));
    assert!(text.contains("boom"));
}

#[test]
fn tail_keeps_only_the_last_lines() {
    let dir = tempdir().unwrap();
    let body = "i=1\nwhile [ $i -le 30 ]; do echo \"line $i\" >&2; i=$((i+1)); done\nexit 2";
    let mut runner = JobRunner::new();
    runner.start(command_for(&dir, body)).unwrap();
    let (progress, outcome) = run_to_completion(&mut runner);
    assert!(progress.is_empty());
    let JobOutcome::Failed(JobFailure::Exit { code, tail, .. }) = outcome else {
        panic!("expected exit failure");
    };
    assert_eq!(code, Some(2));
    assert_eq!(tail.len(), 20);
    assert_eq!(tail.first().map(String::as_str), Some("line 11"));
    assert_eq!(tail.last().map(String::as_str), Some("line 30"));
}

#[test]
fn missing_encoder_is_a_spawn_failure() {
    let dir = tempdir().unwrap();
    let command = EncoderCommand::build(
        &dir.path().join("no-such-ffmpeg"),
        &job_config(dir.path()),
        &dir.path().join("script.txt"),
    );
    let mut runner = JobRunner::new();
    runner.start(command).unwrap();
    let (_, outcome) = run_to_completion(&mut runner);
    assert!(matches!(
        outcome,
        JobOutcome::Failed(JobFailure::Spawn { .. })
    ));
}

#[test]
fn second_start_leaves_running_job_alone() {
    let dir = tempdir().unwrap();
    let mut runner = JobRunner::new();
    let first = runner.start(command_for(&dir, "exec sleep 30")).unwrap();
    let pid = wait_for_pid(&runner);

    let second = runner.start(named_command(&dir, "other-ffmpeg", "exit 0"));
    assert!(matches!(second, Err(Error::JobAlreadyRunning)));
    assert_eq!(runner.current_job(), Some(first));
    assert_eq!(runner.child_pid(), Some(pid));
    assert!(alive(pid));

    runner.shutdown();
}

#[test]
fn shutdown_terminates_live_encoder() {
    let dir = tempdir().unwrap();
    let mut runner = JobRunner::new();
    runner.start(command_for(&dir, "exec sleep 30")).unwrap();
    let pid = wait_for_pid(&runner);
    assert!(alive(pid));

    let started = Instant::now();
    let outcome = runner.shutdown();
    assert!(started.elapsed() < TERMINATE_GRACE * 2);
    assert!(!alive(pid), "encoder survived shutdown");
    assert!(matches!(
        outcome,
        Some(JobOutcome::Failed(JobFailure::Terminated)) | None
    ));
    assert_eq!(runner.state(), RunnerState::Idle);
}

#[test]
fn dropping_runner_terminates_encoder() {
    let dir = tempdir().unwrap();
    let mut runner = JobRunner::new();
    runner.start(command_for(&dir, "exec sleep 30")).unwrap();
    let pid = wait_for_pid(&runner);
    drop(runner);
    assert!(!alive(pid));
}

#[test]
fn stubborn_child_is_killed_after_grace() {
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg("trap '' TERM; exec sleep 30")
        .spawn()
        .unwrap();
    // Give the shell time to install the trap before signalling.
    thread::sleep(Duration::from_millis(200));
    let started = Instant::now();
    terminate_child(&mut child, Duration::from_millis(300));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(child.try_wait().unwrap().is_some());
}
