//! Event-loop side of an encode: owns the job's concat script and settles the job
//! when the runner reports a result.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::command::EncoderCommand;
use crate::concat::ConcatScript;
use crate::error::Error;
use crate::events::{JobFailure, JobId, JobOutcome};
use crate::profile::Codec;
use crate::settings::JobConfiguration;
use crate::tasks::runner::JobRunner;

/// One encode in flight. Settles exactly once.
#[derive(Debug)]
pub struct EncodeJob {
    id: JobId,
    config: JobConfiguration,
    command: EncoderCommand,
    script: Option<ConcatScript>,
    latest_progress: Option<String>,
    started: Instant,
}

impl EncodeJob {
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &JobConfiguration {
        &self.config
    }

    #[must_use]
    pub fn command(&self) -> &EncoderCommand {
        &self.command
    }

    #[must_use]
    pub fn latest_progress(&self) -> Option<&str> {
        self.latest_progress.as_deref()
    }

    #[must_use]
    pub fn script_path(&self) -> Option<&Path> {
        self.script.as_ref().map(ConcatScript::path)
    }

    /// Release the concat script. Removal failures are logged only.
    fn settle(&mut self) {
        if let Some(script) = self.script.take() {
            let path = script.path().to_path_buf();
            if let Err(err) = script.close() {
                warn!(path = %path.display(), %err, "could not remove temp file");
            }
        }
    }
}

/// A job that has reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedJob {
    pub id: JobId,
    pub codec: Codec,
    pub output: PathBuf,
    pub outcome: JobOutcome,
    pub elapsed: Duration,
}

/// Result of one supervisor tick.
#[derive(Debug, Default)]
pub struct Tick {
    /// Cleaned progress text, when new progress arrived.
    pub progress: Option<String>,
    pub finished: Option<FinishedJob>,
}

/// Collapse runs of whitespace and glue `key= value` pairs for display.
#[must_use]
pub fn clean_progress_line(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("= ", "=")
}

#[derive(Default)]
pub struct JobSupervisor {
    runner: JobRunner,
    job: Option<EncodeJob>,
}

impl JobSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.job.is_some()
    }

    #[must_use]
    pub fn job(&self) -> Option<&EncodeJob> {
        self.job.as_ref()
    }

    #[must_use]
    pub fn child_pid(&self) -> Option<u32> {
        self.runner.child_pid()
    }

    /// Write the concat script, build the command and launch the encoder.
    ///
    /// # Errors
    /// [`Error::JobAlreadyRunning`] while a job is active, otherwise whatever failed
    /// while preparing or starting. The script never outlives a failed start.
    pub fn begin(&mut self, config: JobConfiguration, encoder: &Path) -> Result<JobId, Error> {
        if self.job.is_some() {
            return Err(Error::JobAlreadyRunning);
        }
        let script = ConcatScript::build(config.images(), config.per_image())?;
        let command = EncoderCommand::build(encoder, &config, script.path());
        // On error the script is dropped here, which deletes it.
        let id = self.runner.start(command.clone())?;
        info!(
            job = %id,
            images = script.entries(),
            skipped = script.skipped().len(),
            output = %config.output().display(),
            "encode job started"
        );
        self.job = Some(EncodeJob {
            id,
            config,
            command,
            script: Some(script),
            latest_progress: None,
            started: Instant::now(),
        });
        Ok(id)
    }

    /// Drain progress and settle the job if its outcome has arrived.
    pub fn tick(&mut self) -> Tick {
        let Some(job) = self.job.as_mut() else {
            return Tick::default();
        };
        let poll = self.runner.poll();
        let progress = poll.progress.as_deref().map(clean_progress_line);
        if let Some(line) = &progress {
            job.latest_progress = Some(line.clone());
        }
        let finished = poll.outcome.and_then(|outcome| self.settle(outcome));
        Tick { progress, finished }
    }

    /// Terminate any running encoder and settle the job.
    pub fn shutdown(&mut self) -> Option<FinishedJob> {
        self.job.as_ref()?;
        let outcome = self
            .runner
            .shutdown()
            .unwrap_or(JobOutcome::Failed(JobFailure::Terminated));
        self.settle(outcome)
    }

    fn settle(&mut self, outcome: JobOutcome) -> Option<FinishedJob> {
        let mut job = self.job.take()?;
        job.settle();
        let elapsed = job.started.elapsed();
        info!(
            job = %job.id,
            success = outcome.is_success(),
            elapsed = %humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
            "encode job settled"
        );
        Some(FinishedJob {
            id: job.id,
            codec: job.config.profile().codec(),
            output: job.config.output().to_path_buf(),
            outcome,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_lines_are_collapsed() {
        assert_eq!(
            clean_progress_line("frame=   12 fps= 3.0 q=28.0  size=     256kB"),
            "frame=12 fps=3.0 q=28.0 size=256kB"
        );
        assert_eq!(clean_progress_line("  "), "");
    }

    #[test]
    fn idle_supervisor_ticks_quietly() {
        let mut sup = JobSupervisor::new();
        assert!(!sup.is_active());
        let tick = sup.tick();
        assert!(tick.progress.is_none() && tick.finished.is_none());
        assert!(sup.shutdown().is_none());
    }
}
