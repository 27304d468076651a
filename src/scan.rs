//! Discovering image files among user selections and folders.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::Error;

/// Accepted image extensions (lowercase, without dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// Return `true` if `path` has an accepted image extension (case-insensitive).
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|e| *e == ext)
        })
}

/// Recursively collect image files under `root`, ordered by file name per directory.
///
/// # Errors
/// Returns [`Error::BadDir`] if `root` is missing or not a directory.
pub fn scan_folder(root: &Path) -> Result<Vec<PathBuf>, Error> {
    if !root.is_dir() {
        return Err(Error::BadDir(root.to_string_lossy().into_owned()));
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if is_supported_image(path) {
            out.push(path.to_path_buf());
        }
    }
    debug!(root = %root.display(), found = out.len(), "folder scan complete");
    Ok(out)
}

/// Result of expanding a mixed selection of files and folders.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Expanded {
    pub images: Vec<PathBuf>,
    pub folders_scanned: usize,
}

/// Expand dropped or command-line inputs: image files are kept, folders are scanned
/// recursively, everything else is ignored.
#[must_use]
pub fn expand_inputs(inputs: &[PathBuf]) -> Expanded {
    let mut expanded = Expanded::default();
    for input in inputs {
        if input.is_file() && is_supported_image(input) {
            expanded.images.push(input.clone());
        } else if input.is_dir() {
            expanded.folders_scanned += 1;
            info!(path = %input.display(), "scanning folder");
            if let Ok(found) = scan_folder(input) {
                expanded.images.extend(found);
            }
        } else {
            debug!(path = %input.display(), "ignoring input: not an image file or folder");
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(is_supported_image(Path::new("a/b/photo.JPG")));
        assert!(is_supported_image(Path::new("shot.Jpeg")));
        assert!(is_supported_image(Path::new("x.bmp")));
        assert!(!is_supported_image(Path::new("x.webp")));
        assert!(!is_supported_image(Path::new("png")));
        assert!(!is_supported_image(Path::new("notes.txt")));
    }

    #[test]
    fn scan_missing_folder_is_bad_dir() {
        let err = scan_folder(Path::new("/this/path/does/not/exist/for_slideshow_test"))
            .expect_err("scan should fail");
        assert!(matches!(err, Error::BadDir(_)));
    }
}
