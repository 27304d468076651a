//! Turning raw user-entered settings into a validated [`JobConfiguration`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::meta::probe_dimensions;
use crate::profile::OutputProfile;

pub const DEFAULT_DURATION: &str = "1.5";
pub const DEFAULT_QUALITY: &str = "36";
pub const DEFAULT_DOWNSCALE_FACTOR: &str = "0.5";

/// Settings exactly as the user typed them. Nothing here has been checked yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSettings {
    /// Seconds each image stays on screen.
    pub duration: String,
    /// Profile display name, e.g. `"VP9 - .webm"`.
    pub profile: String,
    /// CRF value.
    pub quality: String,
    pub downscale_enabled: bool,
    pub downscale_factor: String,
    pub output: Option<PathBuf>,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION.to_string(),
            profile: OutputProfile::DEFAULT.display_name().to_string(),
            quality: DEFAULT_QUALITY.to_string(),
            downscale_enabled: true,
            downscale_factor: DEFAULT_DOWNSCALE_FACTOR.to_string(),
            output: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please add images first.")]
    NoImages,
    #[error("Time per image must be a number (got '{0}').")]
    DurationNotNumber(String),
    #[error("Delay must be positive.")]
    DurationNotPositive,
    #[error("Invalid profile: {0}")]
    UnknownProfile(String),
    #[error("Error reading first image:\n{}: {reason}", .path.display())]
    FirstImageUnreadable { path: PathBuf, reason: String },
    #[error("Downscale factor must be a number (got '{0}').")]
    FactorNotNumber(String),
    #[error("Downscale factor must be > 0 and <= 1.0.")]
    FactorOutOfRange,
    #[error("Invalid CRF '{0}'. A whole number is required.")]
    QualityNotInteger(String),
    #[error("Invalid CRF. For {family}, use {min}-{max}.")]
    QualityOutOfRange {
        family: &'static str,
        min: u8,
        max: u8,
        value: i64,
    },
    #[error("No output file selected.")]
    MissingOutput,
    #[error("Output folder does not exist: {}", .0.display())]
    OutputDirMissing(PathBuf),
}

/// Everything one encode job needs, checked and frozen.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfiguration {
    images: Vec<PathBuf>,
    per_image: Duration,
    profile: OutputProfile,
    quality: u8,
    width: u32,
    height: u32,
    output: PathBuf,
}

impl JobConfiguration {
    #[must_use]
    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    /// Display time of each image, millisecond precision.
    #[must_use]
    pub fn per_image(&self) -> Duration {
        self.per_image
    }

    #[must_use]
    pub fn profile(&self) -> OutputProfile {
        self.profile
    }

    #[must_use]
    pub fn quality(&self) -> u8 {
        self.quality
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }
}

/// Validate `raw` against `images`, probing the first image from disk.
///
/// # Errors
/// Returns the first [`ValidationError`] encountered, in field order.
pub fn validate(raw: &RawSettings, images: &[PathBuf]) -> Result<JobConfiguration, ValidationError> {
    validate_with(raw, images, probe_dimensions)
}

/// Like [`validate`] with a caller-supplied dimension probe.
///
/// # Errors
/// Returns the first [`ValidationError`] encountered, in field order.
pub fn validate_with<P>(
    raw: &RawSettings,
    images: &[PathBuf],
    probe: P,
) -> Result<JobConfiguration, ValidationError>
where
    P: FnOnce(&Path) -> Result<(u32, u32), String>,
{
    let first = images.first().ok_or(ValidationError::NoImages)?;
    let per_image = parse_duration(&raw.duration)?;
    let profile = OutputProfile::from_name(&raw.profile)
        .ok_or_else(|| ValidationError::UnknownProfile(raw.profile.clone()))?;

    let (native_w, native_h) =
        probe(first).map_err(|reason| ValidationError::FirstImageUnreadable {
            path: first.clone(),
            reason,
        })?;

    let (width, height) = if raw.downscale_enabled {
        let factor = parse_downscale_factor(&raw.downscale_factor)?;
        let target = downscaled_dimensions(native_w, native_h, factor);
        info!(factor, width = target.0, height = target.1, "target size (downscaled)");
        target
    } else {
        info!(width = native_w, height = native_h, "target size (original)");
        (native_w, native_h)
    };

    let quality = parse_quality(profile, &raw.quality)?;

    let output = raw.output.clone().ok_or(ValidationError::MissingOutput)?;
    let parent = match output.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(ValidationError::OutputDirMissing(output.clone())),
    };
    if !parent.is_dir() {
        return Err(ValidationError::OutputDirMissing(parent.to_path_buf()));
    }

    debug!(
        images = images.len(),
        ms = per_image.as_millis() as u64,
        profile = %profile,
        quality,
        "settings validated"
    );
    Ok(JobConfiguration {
        images: images.to_vec(),
        per_image,
        profile,
        quality,
        width,
        height,
        output,
    })
}

/// Seconds as typed, truncated to whole milliseconds.
///
/// # Errors
/// Non-numeric input, non-finite values and anything under one millisecond.
pub fn parse_duration(raw: &str) -> Result<Duration, ValidationError> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::DurationNotNumber(raw.trim().to_string()))?;
    if !secs.is_finite() {
        return Err(ValidationError::DurationNotNumber(raw.trim().to_string()));
    }
    if secs <= 0.0 {
        return Err(ValidationError::DurationNotPositive);
    }
    let millis = (secs * 1000.0) as u64;
    if millis == 0 {
        return Err(ValidationError::DurationNotPositive);
    }
    Ok(Duration::from_millis(millis))
}

/// # Errors
/// Non-numeric input or a factor outside `(0, 1.0]`.
pub fn parse_downscale_factor(raw: &str) -> Result<f64, ValidationError> {
    let factor: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::FactorNotNumber(raw.trim().to_string()))?;
    if factor.is_nan() || factor <= 0.0 || factor > 1.0 {
        return Err(ValidationError::FactorOutOfRange);
    }
    Ok(factor)
}

/// Floor of each axis times `factor`, never below one pixel.
#[must_use]
pub fn downscaled_dimensions(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let scale = |v: u32| ((f64::from(v) * factor).floor() as u32).max(1);
    (scale(width), scale(height))
}

/// # Errors
/// Non-integer input or a value outside the profile codec's CRF range.
pub fn parse_quality(profile: OutputProfile, raw: &str) -> Result<u8, ValidationError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::QualityNotInteger(raw.trim().to_string()))?;
    let codec = profile.codec();
    let range = codec.quality_range();
    match u8::try_from(value) {
        Ok(q) if range.contains(&q) => Ok(q),
        _ => Err(ValidationError::QualityOutOfRange {
            family: codec.family_label(),
            min: *range.start(),
            max: *range.end(),
            value,
        }),
    }
}

/// The resolution line shown under the downscale controls.
///
/// `first` is `None` when the list is empty, `Some(Err(_))` when the first image
/// could not be read.
#[must_use]
pub fn resolution_summary(
    first: Option<Result<(u32, u32), String>>,
    downscale_enabled: bool,
    factor: &str,
) -> String {
    match first {
        None => "(Add images to see resolution)".to_string(),
        Some(Err(_)) => "(Error reading first image)".to_string(),
        Some(Ok((w, h))) if downscale_enabled => match parse_downscale_factor(factor) {
            Ok(f) => {
                let (tw, th) = downscaled_dimensions(w, h, f);
                format!("Downscale {w}x{h} \u{2192} {tw}x{th}")
            }
            Err(_) => format!("Original: {w}x{h}, Invalid Factor"),
        },
        Some(Ok((w, h))) => format!("Original Resolution: {w}x{h}"),
    }
}
