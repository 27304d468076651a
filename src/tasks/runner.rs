//! Runs one encoder process at a time on a dedicated worker thread.
//!
//! The worker owns the child's stderr. Every diagnostic line goes to the log, the
//! last few are kept for failure reports, and `frame=` lines are forwarded as
//! progress. The terminal outcome is sent last, exactly once.

use std::any::Any;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::panic::{self, AssertUnwindSafe};
use std::process::{Child, Command, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use tracing::{debug, error, info, warn};

use crate::command::EncoderCommand;
use crate::error::Error;
use crate::events::{JobFailure, JobId, JobOutcome};

/// Diagnostic lines starting with this are encoder progress reports.
pub const PROGRESS_MARKER: &str = "frame=";
/// Diagnostic lines kept for failure details.
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;
/// How long a terminated encoder may take to exit before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);
/// Prefix of the worker thread name.
pub const WORKER_THREAD_PREFIX: &str = "encode-worker";

const EXIT_POLL: Duration = Duration::from_millis(10);
const SPAWN_BUSY_RETRIES: u32 = 5;
const SPAWN_BUSY_BACKOFF: Duration = Duration::from_millis(20);

type ChildSlot = Arc<Mutex<Option<Child>>>;

fn lock(slot: &ChildSlot) -> MutexGuard<'_, Option<Child>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
}

/// What one poll of the runner produced.
#[derive(Debug, Default)]
pub struct JobPoll {
    /// Most recent progress line since the previous poll.
    pub progress: Option<String>,
    /// Set once, when the job has finished. The runner is idle afterwards.
    pub outcome: Option<JobOutcome>,
}

struct ActiveJob {
    id: JobId,
    child: ChildSlot,
    progress_rx: Receiver<String>,
    outcome_rx: Receiver<JobOutcome>,
    worker: JoinHandle<()>,
}

/// Single-slot encoder runner, driven from the event loop.
#[derive(Default)]
pub struct JobRunner {
    next_id: u64,
    active: Option<ActiveJob>,
}

impl JobRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> RunnerState {
        if self.active.is_some() {
            RunnerState::Running
        } else {
            RunnerState::Idle
        }
    }

    #[must_use]
    pub fn current_job(&self) -> Option<JobId> {
        self.active.as_ref().map(|job| job.id)
    }

    /// OS process id of the running encoder, once the worker has spawned it.
    #[must_use]
    pub fn child_pid(&self) -> Option<u32> {
        let job = self.active.as_ref()?;
        lock(&job.child).as_ref().map(Child::id)
    }

    /// Launch `command` on a new worker thread.
    ///
    /// # Errors
    /// [`Error::JobAlreadyRunning`] if a job is active (it is left untouched), or
    /// [`Error::Worker`] if the thread cannot be created.
    pub fn start(&mut self, command: EncoderCommand) -> Result<JobId, Error> {
        if let Some(job) = &self.active {
            warn!(job = %job.id, "processing already in progress");
            return Err(Error::JobAlreadyRunning);
        }

        self.next_id += 1;
        let id = JobId(self.next_id);
        let (progress_tx, progress_rx) = unbounded();
        let (outcome_tx, outcome_rx) = unbounded();
        let child: ChildSlot = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&child);

        let worker = thread::Builder::new()
            .name(format!("{WORKER_THREAD_PREFIX}-{}", id.0))
            .spawn(move || run_worker(command, slot, progress_tx, outcome_tx))
            .map_err(Error::Worker)?;

        info!(job = %id, "started encoding thread");
        self.active = Some(ActiveJob {
            id,
            child,
            progress_rx,
            outcome_rx,
            worker,
        });
        Ok(id)
    }

    /// Drain queued progress and check for a result without blocking.
    pub fn poll(&mut self) -> JobPoll {
        let Some(job) = self.active.as_ref() else {
            return JobPoll::default();
        };
        let mut progress = drain_latest(&job.progress_rx);
        let outcome = match job.outcome_rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                error!(job = %job.id, "encoder worker exited without a result");
                Some(JobOutcome::Failed(JobFailure::Internal(
                    "worker thread ended without reporting a result".into(),
                )))
            }
        };
        if outcome.is_some() {
            if let Some(last) = drain_latest(&job.progress_rx) {
                progress = Some(last);
            }
            self.finish();
        }
        JobPoll { progress, outcome }
    }

    /// Stop any running encoder and wait up to the grace period for the worker.
    ///
    /// Returns the job's outcome if the worker reported one in time.
    pub fn shutdown(&mut self) -> Option<JobOutcome> {
        let job = self.active.as_ref()?;
        let deadline = Instant::now() + TERMINATE_GRACE;
        loop {
            // The worker may still be spawning, so keep checking the slot.
            let taken = lock(&job.child).take();
            if let Some(mut child) = taken {
                info!(job = %job.id, pid = child.id(), "terminating encoder on shutdown");
                terminate_child(&mut child, TERMINATE_GRACE);
            }
            if job.worker.is_finished() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(EXIT_POLL);
        }
        let outcome = job.outcome_rx.try_recv().ok();
        if outcome.is_none() {
            warn!(job = %job.id, "encoder worker did not report before shutdown");
        }
        self.finish();
        outcome
    }

    fn finish(&mut self) {
        if let Some(job) = self.active.take() {
            if job.worker.is_finished() {
                if job.worker.join().is_err() {
                    error!(job = %job.id, "encoder worker panicked outside its guard");
                }
            } else {
                debug!(job = %job.id, "detaching encoder worker");
            }
        }
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        if self.active.is_some() {
            let _ = self.shutdown();
        }
    }
}

fn drain_latest(rx: &Receiver<String>) -> Option<String> {
    rx.try_iter().last()
}

fn run_worker(
    command: EncoderCommand,
    slot: ChildSlot,
    progress_tx: Sender<String>,
    outcome_tx: Sender<JobOutcome>,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| drive(&command, &slot, &progress_tx)))
        .unwrap_or_else(|payload| {
            let detail = panic_message(payload.as_ref());
            error!(%detail, "encoder worker panicked");
            JobOutcome::Failed(JobFailure::Internal(detail))
        });
    drop(progress_tx);
    match &outcome {
        JobOutcome::Succeeded { output } => info!(output = %output.display(), "encoder finished"),
        JobOutcome::Failed(failure) => error!(%failure, "encoder failed"),
    }
    let _ = outcome_tx.send(outcome);
}

fn drive(command: &EncoderCommand, slot: &ChildSlot, progress_tx: &Sender<String>) -> JobOutcome {
    info!("executing encoder:\n  {}", command.display());
    let mut child = match spawn_retrying(&mut command.to_command()) {
        Ok(child) => child,
        Err(err) => {
            return JobOutcome::Failed(JobFailure::Spawn {
                program: command.program().to_path_buf(),
                reason: err.to_string(),
            });
        }
    };
    let stderr = child.stderr.take();
    *lock(slot) = Some(child);
    let _guard = ChildGuard { slot };

    let mut tail = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
    if let Some(stderr) = stderr {
        for line in DiagnosticLines::new(stderr) {
            info!(target: "encoder", "{line}");
            if line.starts_with(PROGRESS_MARKER) {
                let _ = progress_tx.send(line.clone());
            }
            if tail.len() == DIAGNOSTIC_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    let status = match wait_for_exit(slot) {
        Some(Ok(status)) => status,
        Some(Err(err)) => {
            return JobOutcome::Failed(JobFailure::Internal(format!(
                "waiting for encoder failed: {err}"
            )));
        }
        None => return JobOutcome::Failed(JobFailure::Terminated),
    };

    if status.success() {
        let output = command.output().map(ToOwned::to_owned).unwrap_or_default();
        JobOutcome::Succeeded { output }
    } else {
        JobOutcome::Failed(JobFailure::Exit {
            code: status.code(),
            status: status.to_string(),
            tail: tail.into(),
        })
    }
}

/// Wait for the child in `slot` to exit, releasing it on success.
///
/// `None` means the child was taken by a shutdown.
fn wait_for_exit(slot: &ChildSlot) -> Option<std::io::Result<ExitStatus>> {
    loop {
        {
            let mut guard = lock(slot);
            let child = guard.as_mut()?;
            match child.try_wait() {
                Ok(Some(status)) => {
                    guard.take();
                    return Some(Ok(status));
                }
                Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }
        }
        thread::sleep(EXIT_POLL);
    }
}

/// Terminates whatever child is still in the slot when the worker leaves `drive`.
struct ChildGuard<'a> {
    slot: &'a ChildSlot,
}

impl Drop for ChildGuard<'_> {
    fn drop(&mut self) {
        let taken = lock(self.slot).take();
        if let Some(mut child) = taken {
            warn!(pid = child.id(), "encoder still running as worker exits; terminating");
            terminate_child(&mut child, TERMINATE_GRACE);
        }
    }
}

/// Spawn `command`, backing off briefly while the executable is still held open for
/// writing by some process (`ETXTBSY`).
pub(crate) fn spawn_retrying(command: &mut Command) -> io::Result<Child> {
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Err(err)
                if err.kind() == ErrorKind::ExecutableFileBusy && attempt < SPAWN_BUSY_RETRIES =>
            {
                attempt += 1;
                debug!(attempt, "executable busy, retrying spawn");
                thread::sleep(SPAWN_BUSY_BACKOFF * attempt);
            }
            other => return other,
        }
    }
}

/// Ask the child to stop, then kill it if it is still alive after `grace`.
pub fn terminate_child(child: &mut Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    send_terminate(child);
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = child.id(), %status, "encoder exited after terminate");
                return;
            }
            Ok(None) => thread::sleep(EXIT_POLL),
            Err(_) => break,
        }
    }
    warn!(pid = child.id(), "encoder ignored terminate request; killing");
    if let Err(err) = child.kill() {
        warn!(pid = child.id(), %err, "failed to kill encoder");
    }
    let _ = child.wait();
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        warn!(pid = raw, %err, "failed to send SIGTERM to encoder");
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.kill();
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Lines of a diagnostic stream. `\n` and `\r` both end a line, bytes are decoded
/// lossily, surrounding whitespace is trimmed and blank lines are skipped.
pub struct DiagnosticLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    done: bool,
}

impl<R: Read> DiagnosticLines<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
            done: false,
        }
    }

    fn read_segment(&mut self) {
        self.buf.clear();
        loop {
            let available = match self.reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(%err, "diagnostic stream read failed");
                    self.done = true;
                    return;
                }
            };
            if available.is_empty() {
                self.done = true;
                return;
            }
            if let Some(pos) = available.iter().position(|b| matches!(b, b'\n' | b'\r')) {
                self.buf.extend_from_slice(&available[..pos]);
                self.reader.consume(pos + 1);
                return;
            }
            let len = available.len();
            self.buf.extend_from_slice(available);
            self.reader.consume(len);
        }
    }
}

impl<R: Read> Iterator for DiagnosticLines<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.done {
                return None;
            }
            self.read_segment();
            let line = String::from_utf8_lossy(&self.buf).trim().to_string();
            self.buf.clear();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn diagnostic_lines_split_on_cr_and_lf() {
        let input = b"ffmpeg version x\nframe=  1 fps=0\rframe=  2 fps=1\r\n\n  tail  ".to_vec();
        let lines: Vec<String> = DiagnosticLines::new(Cursor::new(input)).collect();
        assert_eq!(lines, vec!["ffmpeg version x", "frame=  1 fps=0", "frame=  2 fps=1", "tail"]);
    }

    #[test]
    fn diagnostic_lines_replace_invalid_utf8() {
        let input = b"bad \xff byte\n".to_vec();
        let lines: Vec<String> = DiagnosticLines::new(Cursor::new(input)).collect();
        assert_eq!(lines, vec!["bad \u{fffd} byte"]);
    }

    #[test]
    fn idle_runner_polls_empty() {
        let mut runner = JobRunner::new();
        assert_eq!(runner.state(), RunnerState::Idle);
        let poll = runner.poll();
        assert!(poll.progress.is_none() && poll.outcome.is_none());
        assert!(runner.shutdown().is_none());
        assert!(runner.child_pid().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn guard_terminates_child_when_worker_unwinds() {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = Pid::from_raw(i32::try_from(child.id()).unwrap());
        let slot: ChildSlot = Arc::new(Mutex::new(Some(child)));
        let started = Instant::now();
        let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = ChildGuard { slot: &slot };
            panic!("worker blew up");
        }));
        assert!(unwound.is_err());
        assert!(started.elapsed() < TERMINATE_GRACE);
        assert!(lock(&slot).is_none());
        assert!(kill(pid, None).is_err(), "child still alive");
    }

    #[cfg(unix)]
    #[test]
    fn spawn_waits_out_busy_executable() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy-ffmpeg");
        let mut writer = std::fs::File::create(&path).unwrap();
        writer.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
        writer.flush().unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let release = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            drop(writer);
        });
        let mut child = spawn_retrying(&mut Command::new(&path)).unwrap();
        assert!(child.wait().unwrap().success());
        release.join().unwrap();
    }

    #[test]
    fn panic_payloads_become_text() {
        let payload: Box<dyn Any + Send> = Box::new("static msg");
        assert_eq!(panic_message(payload.as_ref()), "static msg");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned msg"));
        assert_eq!(panic_message(payload.as_ref()), "owned msg");
        let payload: Box<dyn Any + Send> = Box::new(5_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
