//! Where the finished video goes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::profile::OutputProfile;

/// `slideshow_<YYYYmmdd_HHMMSS>_<codec><container>`.
#[must_use]
pub fn suggested_file_name<Tz>(profile: OutputProfile, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "slideshow_{}_{}{}",
        now.format("%Y%m%d_%H%M%S"),
        profile.codec().short_name(),
        profile.container()
    )
}

/// Directory offered first when choosing the output: the previous output's folder if it
/// still exists, else the application directory.
#[must_use]
pub fn initial_directory(hint: Option<&Path>, app_dir: &Path) -> PathBuf {
    hint.and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty() && dir.is_dir())
        .map_or_else(|| app_dir.to_path_buf(), Path::to_path_buf)
}

/// Force `path` to end in `container` (e.g. `".webm"`), replacing any other extension.
#[must_use]
pub fn enforce_container(path: &Path, container: &str) -> PathBuf {
    let wanted = container.trim_start_matches('.');
    let matches = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(wanted));
    if matches {
        path.to_path_buf()
    } else {
        path.with_extension(wanted)
    }
}

/// Full default output path for `profile`.
#[must_use]
pub fn suggested_path<Tz>(
    profile: OutputProfile,
    hint: Option<&Path>,
    app_dir: &Path,
    now: &DateTime<Tz>,
) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    initial_directory(hint, app_dir).join(suggested_file_name(profile, now))
}
