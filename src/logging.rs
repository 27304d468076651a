//! Console plus durable log file, and the last-resort panic hook.

use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::tasks::runner::WORKER_THREAD_PREFIX;

pub const LOG_FILE_NAME: &str = "slideshow.log";
/// Console filter when neither `RUST_LOG` nor `-v` is given. Encoder chatter stays
/// in the log file.
pub const DEFAULT_CONSOLE_FILTER: &str = "info,encoder=warn";

#[must_use]
pub fn log_file_path() -> PathBuf {
    std::env::temp_dir().join(LOG_FILE_NAME)
}

fn console_filter(verbosity: u8) -> EnvFilter {
    match verbosity {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_CONSOLE_FILTER)),
        1 => EnvFilter::new("debug,encoder=info"),
        _ => EnvFilter::new("trace"),
    }
}

/// Install the global subscriber. Returns the log file path.
///
/// # Errors
/// The log file cannot be opened or a subscriber is already installed.
pub fn init(verbosity: u8) -> Result<PathBuf> {
    let path = log_file_path();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let console = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .with_filter(console_filter(verbosity));
    let durable = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(console)
        .with(durable)
        .try_init()
        .context("installing tracing subscriber")?;
    info!(path = %path.display(), "using log file location");
    Ok(path)
}

/// Log unhandled panics with a backtrace, then tell the user where the log is and try
/// to open it. Panics on encode worker threads are already reported as job failures,
/// so those are only logged.
pub fn install_panic_hook(log_path: PathBuf) {
    panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let location = info.location().map_or_else(
            || "an unknown location".to_string(),
            |loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()),
        );
        let current = thread::current();
        let thread_name = current.name().unwrap_or("<unnamed>");
        error!(
            thread = thread_name,
            %location,
            "unhandled panic: {message}\n{}",
            Backtrace::force_capture()
        );

        if thread_name.starts_with(WORKER_THREAD_PREFIX) {
            return;
        }
        eprintln!(
            "A critical error occurred and the application needs to close.\n\n\
             Error details have been logged to:\n{}\n\n\
             Attempting to open the log file now...",
            log_path.display()
        );
        if let Err(err) = open_in_viewer(&log_path) {
            error!(path = %log_path.display(), %err, "error opening log file");
        }
    }));
}

/// Open `path` with the desktop's default application.
///
/// # Errors
/// The opener could not be run or reported failure.
pub fn open_in_viewer(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        ));
    }
    let mut cmd = opener();
    let status = cmd
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("opener exited with {status}")))
    }
}

#[cfg(target_os = "windows")]
fn opener() -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", ""]);
    cmd
}

#[cfg(target_os = "macos")]
fn opener() -> Command {
    Command::new("open")
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn opener() -> Command {
    Command::new("xdg-open")
}
