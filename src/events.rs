use std::fmt;
use std::path::PathBuf;

/// Sequence number of an encode job within one runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Terminal result of one encode job, sent exactly once from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { output: PathBuf },
    Failed(JobFailure),
}

impl JobOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// The encoder could not be started at all.
    Spawn { program: PathBuf, reason: String },
    /// The encoder ran and exited unsuccessfully.
    Exit {
        code: Option<i32>,
        status: String,
        tail: Vec<String>,
    },
    /// The encoder was stopped by a shutdown request.
    Terminated,
    /// The worker broke down without a normal result.
    Internal(String),
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { program, reason } => write!(
                f,
                "ffmpeg not runnable.\nPath: '{}'\nEnsure it exists and has execute permissions.\n({reason})",
                program.display()
            ),
            Self::Exit { code, status, tail } => {
                match code {
                    Some(code) => write!(f, "Return Code: {code}")?,
                    None => write!(f, "Encoder stopped: {status}")?,
                }
                if !tail.is_empty() {
                    write!(f, "\n{}", tail.join("\n"))?;
                }
                Ok(())
            }
            Self::Terminated => f.write_str("Encoding was interrupted by shutdown."),
            Self::Internal(detail) => write!(f, "Unexpected encoder thread error: {detail}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Observable state changes published by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    StatusChanged(String),
    TitleChanged(String),
    InteractionChanged(bool),
    ListChanged { len: usize },
    Notice {
        level: NoticeLevel,
        title: String,
        body: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_failure_shows_code_and_tail() {
        let failure = JobFailure::Exit {
            code: Some(1),
            status: "exit status: 1".into(),
            tail: vec!["boom".into(), "more".into()],
        };
        assert_eq!(failure.to_string(), "Return Code: 1\nboom\nmore");
    }

    #[test]
    fn spawn_failure_names_path() {
        let failure = JobFailure::Spawn {
            program: PathBuf::from("/opt/ffmpeg"),
            reason: "Permission denied".into(),
        };
        let text = failure.to_string();
        assert!(text.starts_with("ffmpeg not runnable.\nPath: '/opt/ffmpeg'"));
        assert!(text.contains("Permission denied"));
    }
}
