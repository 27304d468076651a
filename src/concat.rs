//! Concat-demuxer scripts: one `file`/`duration` pair per image.

use std::borrow::Cow;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::{Builder, TempPath};
use tracing::{debug, info, warn};

use crate::error::Error;

const SCRIPT_PREFIX: &str = "slideshow-concat-";
const SCRIPT_SUFFIX: &str = ".txt";

/// Wrap a path in single quotes, writing each embedded `'` as `'\''`.
#[must_use]
pub fn quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}

/// Byte-level [`quote`], appended to `out`.
fn push_quoted(out: &mut Vec<u8>, raw: &[u8]) {
    out.push(b'\'');
    for &byte in raw {
        if byte == b'\'' {
            out.extend_from_slice(br"'\''");
        } else {
            out.push(byte);
        }
    }
    out.push(b'\'');
}

/// Inverse of [`quote`]. Returns `None` if `quoted` is not in that form.
#[must_use]
pub fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut rest = inner;
    while let Some(pos) = rest.find('\'') {
        out.push_str(&rest[..pos]);
        rest = rest[pos..].strip_prefix(r"'\''")?;
        out.push('\'');
    }
    out.push_str(rest);
    Some(out)
}

/// Raw bytes of `path` as the encoder will open it, or `None` when the platform
/// cannot express the name as bytes without loss.
#[cfg(unix)]
fn path_bytes(path: &Path) -> Option<Cow<'_, [u8]>> {
    use std::os::unix::ffi::OsStrExt;

    Some(Cow::Borrowed(path.as_os_str().as_bytes()))
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Option<Cow<'_, [u8]>> {
    path.to_str().map(|s| Cow::Borrowed(s.as_bytes()))
}

/// Seconds as the demuxer reads them: `2.0`, `1.5`, `0.25`.
fn format_seconds(duration: Duration) -> String {
    format!("{:?}", duration.as_secs_f64())
}

fn push_file_line(out: &mut Vec<u8>, path: &Path) {
    out.extend_from_slice(b"file ");
    match path_bytes(path) {
        Some(bytes) => push_quoted(out, &bytes),
        None => push_quoted(out, path.to_string_lossy().as_bytes()),
    }
    out.push(b'\n');
}

/// Render the script for `entries` in order. The last entry's `file` line is
/// repeated without a duration so the final image is held for its full time.
///
/// File names are written byte for byte, so names that are not valid UTF-8 reach
/// the encoder unchanged.
#[must_use]
pub fn render_script(entries: &[PathBuf], per_image: Duration) -> Vec<u8> {
    let duration_line = format!("duration {}\n", format_seconds(per_image));
    let mut out = Vec::new();
    for path in entries {
        push_file_line(&mut out, path);
        out.extend_from_slice(duration_line.as_bytes());
    }
    if let Some(last) = entries.last() {
        push_file_line(&mut out, last);
    }
    out
}

/// A concat script on disk. The file is deleted when this handle is dropped.
#[derive(Debug)]
pub struct ConcatScript {
    path: TempPath,
    entries: usize,
    skipped: Vec<PathBuf>,
}

impl ConcatScript {
    /// Build a script in the system temporary directory.
    ///
    /// # Errors
    /// [`Error::NoImagesOnDisk`] when none of `images` exist, [`Error::Script`] when the
    /// temporary file cannot be created or written.
    pub fn build(images: &[PathBuf], per_image: Duration) -> Result<Self, Error> {
        Self::build_in(&std::env::temp_dir(), images, per_image)
    }

    /// Like [`ConcatScript::build`] but inside `dir`.
    ///
    /// # Errors
    /// See [`ConcatScript::build`].
    pub fn build_in(dir: &Path, images: &[PathBuf], per_image: Duration) -> Result<Self, Error> {
        let mut present = Vec::with_capacity(images.len());
        let mut skipped = Vec::new();
        for path in images {
            if !path.exists() {
                warn!(path = %path.display(), "image file not found, skipping");
                skipped.push(path.clone());
            } else if path_bytes(path).is_none() {
                warn!(path = %path.display(), "image file name cannot be written to the script, skipping");
                skipped.push(path.clone());
            } else {
                present.push(path.clone());
            }
        }
        if present.is_empty() {
            return Err(Error::NoImagesOnDisk(images.len()));
        }

        let text = render_script(&present, per_image);
        let mut file = Builder::new()
            .prefix(SCRIPT_PREFIX)
            .suffix(SCRIPT_SUFFIX)
            .tempfile_in(dir)
            .map_err(Error::Script)?;
        file.write_all(&text).map_err(Error::Script)?;
        file.flush().map_err(Error::Script)?;
        let path = file.into_temp_path();
        info!(path = %path.display(), entries = present.len(), "generated concat file");
        Ok(Self {
            path,
            entries: present.len(),
            skipped,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Images written to the script.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Listed images that were missing on disk.
    #[must_use]
    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    /// Delete the script now, reporting failure instead of swallowing it.
    ///
    /// # Errors
    /// The underlying removal error.
    pub fn close(self) -> std::io::Result<()> {
        let shown = self.path.to_path_buf();
        self.path.close()?;
        debug!(path = %shown.display(), "removed concat file");
        Ok(())
    }
}
