//! Encoder argument vectors.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::settings::JobConfiguration;

/// Scale to fit inside `width`x`height` keeping aspect, pad the rest black, and emit
/// 4:2:0 frames.
#[must_use]
pub fn filter_chain(width: u32, height: u32) -> String {
    format!(
        "scale={width}:{height}:force_original_aspect_ratio=decrease,\
         pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black,\
         format=pix_fmts=yuv420p"
    )
}

/// Program plus arguments for one encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl EncoderCommand {
    #[must_use]
    pub fn build(encoder: &Path, config: &JobConfiguration, script: &Path) -> Self {
        let codec = config.profile().codec();
        let mut args: Vec<OsString> = ["-y", "-f", "concat", "-safe", "0", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(script.as_os_str().to_owned());
        args.push("-vf".into());
        args.push(filter_chain(config.width(), config.height()).into());
        args.push("-c:v".into());
        args.push(codec.encoder_name().into());
        args.push("-crf".into());
        args.push(config.quality().to_string().into());
        args.push("-progress".into());
        args.push("-".into());
        args.extend(codec.tuning_flags().iter().map(OsString::from));
        args.push(config.output().as_os_str().to_owned());
        Self {
            program: encoder.to_path_buf(),
            args,
        }
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Destination file, always the final argument.
    #[must_use]
    pub fn output(&self) -> Option<&Path> {
        self.args.last().map(Path::new)
    }

    /// A process builder with stderr piped and the other streams closed.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    /// Shell-quoted rendering for the log.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_quote(arg: &OsStr) -> String {
    let s = arg.to_string_lossy();
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        s.into_owned()
    } else {
        format!("'{}'", s.replace('\'', r#"'"'"'"#))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{RawSettings, validate_with};

    fn config(profile: &str, quality: &str, out: &Path) -> JobConfiguration {
        let raw = RawSettings {
            profile: profile.into(),
            quality: quality.into(),
            downscale_enabled: false,
            output: Some(out.to_path_buf()),
            ..RawSettings::default()
        };
        validate_with(&raw, &[PathBuf::from("/i/a.png")], |_| Ok((1280, 720))).unwrap()
    }

    fn strings(cmd: &EncoderCommand) -> Vec<String> {
        cmd.args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn filter_chain_shape() {
        assert_eq!(
            filter_chain(640, 360),
            "scale=640:360:force_original_aspect_ratio=decrease,\
             pad=640:360:(ow-iw)/2:(oh-ih)/2:color=black,format=pix_fmts=yuv420p"
        );
    }

    #[test]
    fn vp9_argument_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("o.webm");
        let cfg = config("VP9 - .webm", "36", &out);
        let cmd = EncoderCommand::build(Path::new("/bin/ffmpeg"), &cfg, Path::new("/tmp/s.txt"));
        let args = strings(&cmd);
        assert_eq!(
            &args[..7],
            &["-y", "-f", "concat", "-safe", "0", "-i", "/tmp/s.txt"]
        );
        assert_eq!(args[7], "-vf");
        assert_eq!(args[8], filter_chain(1280, 720));
        assert_eq!(
            &args[9..15],
            &["-c:v", "libvpx-vp9", "-crf", "36", "-progress", "-"]
        );
        assert_eq!(
            &args[15..23],
            &["-speed", "1", "-tile-columns", "2", "-auto-alt-ref", "1", "-lag-in-frames", "25"]
        );
        assert_eq!(args.len(), 24);
        assert_eq!(cmd.output(), Some(out.as_path()));
    }

    #[test]
    fn h264_and_av1_tuning() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config("H.264 - .mp4", "23", &dir.path().join("o.mp4"));
        let args = strings(&EncoderCommand::build(Path::new("ffmpeg"), &cfg, Path::new("s")));
        assert_eq!(&args[15..17], &["-preset", "medium"]);

        let cfg = config("AV1 - .webm", "30", &dir.path().join("o.webm"));
        let args = strings(&EncoderCommand::build(Path::new("ffmpeg"), &cfg, Path::new("s")));
        assert_eq!(args[10], "libaom-av1");
        assert_eq!(
            &args[15..23],
            &["-cpu-used", "4", "-row-mt", "1", "-tile-columns", "2", "-tile-rows", "2"]
        );
    }

    #[test]
    fn display_quotes_unsafe_tokens() {
        assert_eq!(shell_quote(OsStr::new("-crf")), "-crf");
        assert_eq!(shell_quote(OsStr::new("a b")), "'a b'");
        assert_eq!(shell_quote(OsStr::new("it's")), r#"'it'"'"'s'"#);
        assert_eq!(shell_quote(OsStr::new("")), "''");
        assert_eq!(
            shell_quote(OsStr::new("scale=1:1,pad=(ow-iw)/2")),
            "'scale=1:1,pad=(ow-iw)/2'"
        );
    }
}
