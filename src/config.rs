//! Persisted user preferences.
//!
//! The file is a flat JSON object. Loading is lenient: every key falls back to its
//! default on its own, older profile names are remapped, and a broken file yields
//! the defaults. Saving never fails the caller.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::profile::{OutputProfile, ProfileResolution};
use crate::settings::{
    DEFAULT_DOWNSCALE_FACTOR, DEFAULT_DURATION, DEFAULT_QUALITY, RawSettings,
    parse_downscale_factor,
};

/// File name used when no explicit preferences path is given.
pub const PREFERENCES_FILE_NAME: &str = "slideshow-settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub output_file_hint: Option<PathBuf>,
    pub time_per_image_sec: String,
    pub downscale_factor: String,
    pub quality_crf: String,
    pub output_profile: String,
    pub downscale_enabled: bool,
    pub last_add_directory: PathBuf,
}

impl Preferences {
    /// Defaults match the "Small WebM" preset.
    #[must_use]
    pub fn defaults(app_dir: &Path) -> Self {
        Self {
            output_file_hint: None,
            time_per_image_sec: DEFAULT_DURATION.to_string(),
            downscale_factor: DEFAULT_DOWNSCALE_FACTOR.to_string(),
            quality_crf: DEFAULT_QUALITY.to_string(),
            output_profile: OutputProfile::DEFAULT.display_name().to_string(),
            downscale_enabled: true,
            last_add_directory: app_dir.to_path_buf(),
        }
    }

    /// Seed the editable settings from these preferences.
    #[must_use]
    pub fn raw_settings(&self) -> RawSettings {
        RawSettings {
            duration: self.time_per_image_sec.clone(),
            profile: self.output_profile.clone(),
            quality: self.quality_crf.clone(),
            downscale_enabled: self.downscale_enabled,
            downscale_factor: self.downscale_factor.clone(),
            output: None,
        }
    }

    /// Snapshot the current settings for saving.
    pub fn capture(&mut self, raw: &RawSettings, output_hint: Option<&Path>, last_add: &Path) {
        self.time_per_image_sec = raw.duration.clone();
        self.output_profile = raw.profile.clone();
        self.quality_crf = raw.quality.clone();
        self.downscale_enabled = raw.downscale_enabled;
        self.downscale_factor = raw.downscale_factor.clone();
        self.output_file_hint = output_hint.map(Path::to_path_buf);
        self.last_add_directory = last_add.to_path_buf();
    }
}

/// Where loaded preferences came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    File,
    Defaults,
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub prefs: Preferences,
    pub source: Source,
}

impl Loaded {
    /// Status text shown after startup.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self.source {
            Source::File => "Settings loaded.",
            Source::Defaults => "Using default settings (Small WebM).",
        }
    }
}

/// Directory of the running executable, falling back to the working directory.
#[must_use]
pub fn app_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[must_use]
pub fn default_path(app_dir: &Path) -> PathBuf {
    app_dir.join(PREFERENCES_FILE_NAME)
}

/// Load preferences from `path`, never failing.
#[must_use]
pub fn load(path: &Path, app_dir: &Path) -> Loaded {
    let defaults = Preferences::defaults(app_dir);
    if !path.exists() {
        info!(path = %path.display(), "preferences file not found; using defaults");
        return Loaded {
            prefs: defaults,
            source: Source::Defaults,
        };
    }
    match read_object(path) {
        Ok(map) => Loaded {
            prefs: merge(defaults, &map),
            source: Source::File,
        },
        Err(err) => {
            warn!(path = %path.display(), %err, "error loading preferences; using defaults");
            Loaded {
                prefs: defaults,
                source: Source::Defaults,
            }
        }
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>, Error> {
    let text = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("expected a JSON object, found {}", kind_name(&other)),
        ))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Text fields accept strings and bare numbers.
fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn merge(mut prefs: Preferences, map: &Map<String, Value>) -> Preferences {
    if let Some(value) = map.get("output_file_hint") {
        prefs.output_file_hint = value.as_str().filter(|s| !s.is_empty()).map(PathBuf::from);
    }
    if let Some(duration) = text_field(map, "time_per_image_sec") {
        prefs.time_per_image_sec = duration;
    }
    if let Some(quality) = text_field(map, "quality_crf") {
        prefs.quality_crf = quality;
    }

    if let Some(name) = map.get("output_profile").and_then(Value::as_str) {
        let (profile, how) = OutputProfile::resolve_persisted(name);
        match how {
            ProfileResolution::Canonical => {}
            ProfileResolution::Remapped => {
                info!(old = name, new = %profile, "mapping old profile name");
            }
            ProfileResolution::Defaulted => {
                warn!(profile = name, "unrecognized profile in preferences; using default");
            }
        }
        prefs.output_profile = profile.display_name().to_string();
    }

    if let Some(raw) = map.get("downscale_factor") {
        let parsed = text_field(map, "downscale_factor")
            .and_then(|text| parse_downscale_factor(&text).ok());
        match parsed {
            Some(factor) => prefs.downscale_factor = format!("{factor:?}"),
            None => warn!(value = %raw, "invalid downscale_factor; using default"),
        }
    }

    match map.get("downscale_enabled") {
        Some(Value::Bool(enabled)) => prefs.downscale_enabled = *enabled,
        Some(other) => debug!(value = %other, "non-boolean downscale_enabled ignored"),
        None => {}
    }

    if let Some(dir) = map.get("last_add_directory").and_then(Value::as_str) {
        let dir = PathBuf::from(dir);
        if dir.is_dir() {
            prefs.last_add_directory = dir;
        } else {
            warn!(
                dir = %dir.display(),
                fallback = %prefs.last_add_directory.display(),
                "invalid last_add_directory; resetting"
            );
        }
    }
    prefs
}

/// Write `prefs` to `path` as pretty JSON.
///
/// # Errors
/// Serialization or write failure.
pub fn save(path: &Path, prefs: &Preferences) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(prefs)?;
    fs::write(path, text)?;
    info!(path = %path.display(), "settings saved");
    Ok(())
}

/// [`save`], logging instead of returning failures.
pub fn save_or_warn(path: &Path, prefs: &Preferences) {
    if let Err(err) = save(path, prefs) {
        warn!(path = %path.display(), %err, "error saving preferences");
    }
}
