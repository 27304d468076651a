//! Output profiles: codec/container pairs, quality ranges and encoder tuning.

use std::fmt;
use std::ops::RangeInclusive;

/// Video codecs the encoder is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Vp9,
    Av1,
    H264,
}

const VP9_TUNING: &[&str] = &[
    "-speed",
    "1",
    "-tile-columns",
    "2",
    "-auto-alt-ref",
    "1",
    "-lag-in-frames",
    "25",
];
const H264_TUNING: &[&str] = &["-preset", "medium"];
const AV1_TUNING: &[&str] = &[
    "-cpu-used",
    "4",
    "-row-mt",
    "1",
    "-tile-columns",
    "2",
    "-tile-rows",
    "2",
];

// Inclusive upper bound of each quality tier, best quality first.
const WEBM_TIERS: [u8; 5] = [15, 30, 45, 55, 63];
const H264_TIERS: [u8; 5] = [17, 23, 28, 35, 51];

const TIER_LABELS: [&str; 5] = [
    "Very High Quality / Large File",
    "High Quality / Med-Large File",
    "Medium Quality / Medium File",
    "Low Quality / Small File",
    "Very Low Quality / Very Small File",
];

impl Codec {
    /// Encoder library name passed to `-c:v`.
    #[must_use]
    pub const fn encoder_name(self) -> &'static str {
        match self {
            Self::Vp9 => "libvpx-vp9",
            Self::Av1 => "libaom-av1",
            Self::H264 => "libx264",
        }
    }

    /// Short tag used in suggested file names.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::H264 => "h264",
        }
    }

    /// Name of the quality-range family shown in validation messages.
    #[must_use]
    pub const fn family_label(self) -> &'static str {
        match self {
            Self::Vp9 | Self::Av1 => "VP9/AV1",
            Self::H264 => "H.264",
        }
    }

    /// Valid CRF values, inclusive.
    #[must_use]
    pub const fn quality_range(self) -> RangeInclusive<u8> {
        match self {
            Self::Vp9 | Self::Av1 => 0..=63,
            Self::H264 => 0..=51,
        }
    }

    /// Fixed performance/quality flags appended after the common arguments.
    #[must_use]
    pub const fn tuning_flags(self) -> &'static [&'static str] {
        match self {
            Self::Vp9 => VP9_TUNING,
            Self::Av1 => AV1_TUNING,
            Self::H264 => H264_TUNING,
        }
    }

    const fn tiers(self) -> &'static [u8; 5] {
        match self {
            Self::Vp9 | Self::Av1 => &WEBM_TIERS,
            Self::H264 => &H264_TIERS,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoder_name())
    }
}

/// A named pairing of codec and container presented as a single choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputProfile {
    Vp9Webm,
    Av1Webm,
    H264Mp4,
}

/// Older profile names found in preference files written by earlier releases.
const LEGACY_PROFILE_NAMES: &[(&str, OutputProfile)] = &[
    ("Compatible (MP4 / H.264)", OutputProfile::H264Mp4),
    ("Balanced (WebM / VP9)", OutputProfile::Vp9Webm),
    (
        "Smallest File (WebM / AV1 - Slow Encode)",
        OutputProfile::Av1Webm,
    ),
    (".mp4 - H.264", OutputProfile::H264Mp4),
    (".webm - VP9", OutputProfile::Vp9Webm),
    (".webm - AV1", OutputProfile::Av1Webm),
    ("MP4 (H.264 - Compatible)", OutputProfile::H264Mp4),
    ("WebM (VP9 - Efficient)", OutputProfile::Vp9Webm),
    ("WebM (AV1 - Max Efficiency)", OutputProfile::Av1Webm),
];

/// How a persisted profile name was turned into a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileResolution {
    Canonical,
    Remapped,
    Defaulted,
}

impl OutputProfile {
    pub const ALL: &'static [Self] = &[Self::Vp9Webm, Self::Av1Webm, Self::H264Mp4];
    pub const DEFAULT: Self = Self::Vp9Webm;

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Vp9Webm => "VP9 - .webm",
            Self::Av1Webm => "AV1 - .webm",
            Self::H264Mp4 => "H.264 - .mp4",
        }
    }

    #[must_use]
    pub const fn codec(self) -> Codec {
        match self {
            Self::Vp9Webm => Codec::Vp9,
            Self::Av1Webm => Codec::Av1,
            Self::H264Mp4 => Codec::H264,
        }
    }

    /// Container extension including the leading dot.
    #[must_use]
    pub const fn container(self) -> &'static str {
        match self {
            Self::Vp9Webm | Self::Av1Webm => ".webm",
            Self::H264Mp4 => ".mp4",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Vp9Webm => "VP9 codec has decent compression.",
            Self::Av1Webm => "AV1 codec has the best compression.",
            Self::H264Mp4 => {
                "H.264 codec is widely supported, but offers less compression than VP9/AV1."
            }
        }
    }

    /// Exact lookup by display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.display_name() == name)
    }

    #[must_use]
    pub fn from_legacy_name(name: &str) -> Option<Self> {
        LEGACY_PROFILE_NAMES
            .iter()
            .find(|(legacy, _)| *legacy == name)
            .map(|(_, profile)| *profile)
    }

    /// Lenient lookup used when loading persisted names: canonical first, then the
    /// legacy table, then the default profile.
    #[must_use]
    pub fn resolve_persisted(name: &str) -> (Self, ProfileResolution) {
        if let Some(profile) = Self::from_name(name) {
            (profile, ProfileResolution::Canonical)
        } else if let Some(profile) = Self::from_legacy_name(name) {
            (profile, ProfileResolution::Remapped)
        } else {
            (Self::DEFAULT, ProfileResolution::Defaulted)
        }
    }
}

impl fmt::Display for OutputProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Expected quality/size trade-off for a quality entry, as shown next to the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityHint {
    Tier(&'static str),
    OutOfRange(Codec),
    NotANumber,
    UnknownProfile,
}

impl fmt::Display for QualityHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tier(label) => f.write_str(label),
            Self::OutOfRange(codec) => {
                let range = codec.quality_range();
                write!(
                    f,
                    "Range ({}): {}-{}",
                    codec.short_name().to_ascii_uppercase(),
                    range.start(),
                    range.end()
                )
            }
            Self::NotANumber => f.write_str("Invalid CRF (Number Required)"),
            Self::UnknownProfile => f.write_str("Unknown Codec"),
        }
    }
}

#[must_use]
pub fn quality_hint(profile: &str, raw_quality: &str) -> QualityHint {
    let Some(profile) = OutputProfile::from_name(profile) else {
        return QualityHint::UnknownProfile;
    };
    let codec = profile.codec();
    let Ok(value) = raw_quality.trim().parse::<i64>() else {
        return QualityHint::NotANumber;
    };
    let range = codec.quality_range();
    if value < i64::from(*range.start()) || value > i64::from(*range.end()) {
        return QualityHint::OutOfRange(codec);
    }
    codec
        .tiers()
        .iter()
        .zip(TIER_LABELS)
        .find(|(bound, _)| value <= i64::from(**bound))
        .map_or(QualityHint::OutOfRange(codec), |(_, label)| {
            QualityHint::Tier(label)
        })
}

/// One-click settings bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    SmallWebm,
    QualityWebm,
}

impl Preset {
    #[must_use]
    pub const fn profile(self) -> OutputProfile {
        match self {
            Self::SmallWebm => OutputProfile::Vp9Webm,
            Self::QualityWebm => OutputProfile::Av1Webm,
        }
    }

    #[must_use]
    pub const fn quality(self) -> &'static str {
        match self {
            Self::SmallWebm => "36",
            Self::QualityWebm => "24",
        }
    }

    #[must_use]
    pub const fn downscale_enabled(self) -> bool {
        matches!(self, Self::SmallWebm)
    }

    #[must_use]
    pub const fn downscale_factor(self) -> &'static str {
        match self {
            Self::SmallWebm => "0.5",
            Self::QualityWebm => "1.0",
        }
    }

    #[must_use]
    pub const fn status(self) -> &'static str {
        match self {
            Self::SmallWebm => "Applied 'Small WebM' preset (VP9).",
            Self::QualityWebm => "Applied 'Quality WebM' preset (AV1).",
        }
    }
}
