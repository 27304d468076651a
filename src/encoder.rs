//! Finding a runnable ffmpeg.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::tasks::runner::spawn_retrying;

#[cfg(windows)]
pub const ENCODER_EXE: &str = "ffmpeg.exe";
#[cfg(not(windows))]
pub const ENCODER_EXE: &str = "ffmpeg";

/// Locate the encoder: `explicit` if given, else next to the executable, else on `PATH`.
///
/// # Errors
/// [`Error::EncoderNotFound`] when no candidate runs, [`Error::EncoderPermissions`]
/// when a candidate lacks the execute bit and it cannot be set.
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, Error> {
    let app_dir = crate::config::app_directory();
    locate_in(explicit, &app_dir, std::env::var_os("PATH"))
}

/// [`locate`] with the search roots spelled out.
///
/// # Errors
/// See [`locate`].
pub fn locate_in(
    explicit: Option<&Path>,
    app_dir: &Path,
    path_var: Option<OsString>,
) -> Result<PathBuf, Error> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    } else {
        candidates.push(app_dir.join(ENCODER_EXE));
        if let Some(var) = path_var {
            candidates.extend(std::env::split_paths(&var).map(|dir| dir.join(ENCODER_EXE)));
        }
    }

    for candidate in &candidates {
        if !candidate.is_file() {
            debug!(path = %candidate.display(), "no encoder here");
            continue;
        }
        ensure_executable(candidate)?;
        if runs(candidate) {
            info!(path = %candidate.display(), "found ffmpeg");
            return Ok(candidate.clone());
        }
        warn!(path = %candidate.display(), "ffmpeg candidate did not run");
    }

    let searched = candidates
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::EncoderNotFound { searched })
}

/// `<encoder> -version` exits successfully.
#[must_use]
pub fn runs(encoder: &Path) -> bool {
    let mut probe = Command::new(encoder);
    probe
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    spawn_retrying(&mut probe)
        .and_then(|mut child| child.wait())
        .is_ok_and(|status| status.success())
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    let meta = std::fs::metadata(path).map_err(|source| Error::EncoderPermissions {
        path: path.to_path_buf(),
        source,
    })?;
    if meta.permissions().mode() & 0o111 != 0 {
        return Ok(());
    }
    warn!(path = %path.display(), "ffmpeg lacks execute permissions; attempting to set");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|source| {
        Error::EncoderPermissions {
            path: path.to_path_buf(),
            source,
        }
    })?;
    info!(path = %path.display(), "execute permissions set");
    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> Result<(), Error> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_stub(dir: &Path, mode: u32) -> PathBuf {
        let path = dir.join(ENCODER_EXE);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn finds_encoder_next_to_app() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_stub(dir.path(), 0o755);
        let found = locate_in(None, dir.path(), None).unwrap();
        assert_eq!(found, stub);
    }

    #[test]
    fn fixes_missing_execute_bit() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_stub(dir.path(), 0o644);
        let found = locate_in(Some(&stub), Path::new("/nowhere"), None).unwrap();
        assert_eq!(found, stub);
        let mode = fs::metadata(&stub).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn searches_path_entries() {
        let app = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let stub = write_stub(bin.path(), 0o755);
        let var = std::env::join_paths([Path::new("/no/such/dir"), bin.path()]).unwrap();
        assert_eq!(locate_in(None, app.path(), Some(var)).unwrap(), stub);
    }

    #[test]
    fn missing_everywhere_is_not_found() {
        let app = tempfile::tempdir().unwrap();
        let err = locate_in(None, app.path(), None).unwrap_err();
        assert!(matches!(err, Error::EncoderNotFound { .. }));
        let failing = app.path().join("broken");
        fs::write(&failing, "#!/bin/sh\nexit 3\n").unwrap();
        fs::set_permissions(&failing, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(
            locate_in(Some(&failing), app.path(), None),
            Err(Error::EncoderNotFound { .. })
        ));
    }
}
