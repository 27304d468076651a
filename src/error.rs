use std::path::PathBuf;

use thiserror::Error;

use crate::settings::ValidationError;

/// Library error type for slideshow operations.
#[derive(Debug, Error)]
pub enum Error {
    /// User-entered settings were rejected; the job never starts.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A folder given for scanning is missing or not a directory.
    #[error("invalid image directory: {0}")]
    BadDir(String),

    /// Every listed image vanished from disk before the concat script was written.
    #[error("none of the {0} listed images exist on disk")]
    NoImagesOnDisk(usize),

    /// The concat script could not be created or written.
    #[error("failed to write concat script: {0}")]
    Script(#[source] std::io::Error),

    /// Another encode job is still running.
    #[error("an encode job is already running")]
    JobAlreadyRunning,

    /// The worker thread for an encode job could not be started.
    #[error("failed to start encode worker: {0}")]
    Worker(#[source] std::io::Error),

    /// No runnable encoder binary was found.
    #[error("ffmpeg executable not found (searched: {searched})")]
    EncoderNotFound { searched: String },

    /// The encoder binary exists but could not be made executable.
    #[error("'{}' lacks execute permissions and they could not be set: {source}", .path.display())]
    EncoderPermissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON preferences error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
