//! Application controller: owns all user-visible state and turns typed commands into
//! state changes, published to subscribers as [`AppEvent`]s.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::select;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{self, Loaded, Preferences};
use crate::events::{AppEvent, JobOutcome, NoticeLevel};
use crate::meta::probe_dimensions;
use crate::output::{enforce_container, suggested_path};
use crate::playlist::ImageList;
use crate::profile::{OutputProfile, Preset, QualityHint, quality_hint};
use crate::scan::{expand_inputs, scan_folder};
use crate::settings::{RawSettings, resolution_summary, validate};
use crate::tasks::supervisor::{FinishedJob, JobSupervisor};

pub const APP_TITLE: &str = "Images to Video Slideshow";
/// Delay before the first poll of a freshly started job.
pub const INITIAL_POLL_DELAY: Duration = Duration::from_millis(100);
pub const POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Everything the user can see or edit.
#[derive(Debug, Clone)]
pub struct AppState {
    pub images: ImageList,
    pub settings: RawSettings,
    pub output_hint: Option<PathBuf>,
    pub last_add_directory: PathBuf,
    pub status: String,
    pub title: String,
    pub interactive: bool,
    pub last_outcome: Option<FinishedJob>,
}

/// One user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddFiles(Vec<PathBuf>),
    AddFolder(PathBuf),
    /// Files and folders dropped onto the list.
    DropPaths(Vec<PathBuf>),
    RemoveEntries(Vec<usize>),
    ClearImages,
    MoveEntry { from: usize, to: usize },
    Shuffle { seed: Option<u64> },
    SortByName,
    SetDuration(String),
    SetProfile(String),
    SetQuality(String),
    SetDownscaleEnabled(bool),
    SetDownscaleFactor(String),
    ApplyPreset(Preset),
    SetOutput(PathBuf),
    ConfirmOverwrite(bool),
    StartEncode,
    PollJob,
    Shutdown,
}

impl Command {
    fn mutates_inputs(&self) -> bool {
        !matches!(self, Self::StartEncode | Self::PollJob | Self::Shutdown)
    }
}

pub struct Controller {
    state: AppState,
    prefs: Preferences,
    prefs_path: PathBuf,
    app_dir: PathBuf,
    encoder: PathBuf,
    overwrite_confirmed: bool,
    supervisor: JobSupervisor,
    subscribers: Vec<Sender<AppEvent>>,
}

impl Controller {
    pub fn new(encoder: PathBuf, prefs_path: PathBuf, app_dir: PathBuf, loaded: Loaded) -> Self {
        let status = loaded.status().to_string();
        let prefs = loaded.prefs;
        let state = AppState {
            images: ImageList::new(),
            settings: prefs.raw_settings(),
            output_hint: prefs.output_file_hint.clone(),
            last_add_directory: prefs.last_add_directory.clone(),
            status,
            title: APP_TITLE.to_string(),
            interactive: true,
            last_outcome: None,
        };
        Self {
            state,
            prefs,
            prefs_path,
            app_dir,
            encoder,
            overwrite_confirmed: false,
            supervisor: JobSupervisor::new(),
            subscribers: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub fn job_active(&self) -> bool {
        self.supervisor.is_active()
    }

    #[must_use]
    pub fn supervisor(&self) -> &JobSupervisor {
        &self.supervisor
    }

    #[must_use]
    pub fn encoder(&self) -> &Path {
        &self.encoder
    }

    /// Receive every event published from now on.
    pub fn subscribe(&mut self) -> Receiver<AppEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    #[must_use]
    pub fn quality_hint(&self) -> QualityHint {
        quality_hint(&self.state.settings.profile, &self.state.settings.quality)
    }

    #[must_use]
    pub fn resolution_summary(&self) -> String {
        let first = self.state.images.first().map(|e| probe_dimensions(e.path()));
        resolution_summary(
            first,
            self.state.settings.downscale_enabled,
            &self.state.settings.downscale_factor,
        )
    }

    /// Output path the next encode will use.
    #[must_use]
    pub fn planned_output(&self) -> PathBuf {
        let profile = OutputProfile::from_name(&self.state.settings.profile)
            .unwrap_or(OutputProfile::DEFAULT);
        match &self.state.settings.output {
            Some(path) => enforce_container(path, profile.container()),
            None => suggested_path(
                profile,
                self.state.output_hint.as_deref(),
                &self.app_dir,
                &chrono::Local::now(),
            ),
        }
    }

    pub fn dispatch(&mut self, command: Command) {
        if self.job_active() && command.mutates_inputs() {
            debug!(?command, "ignored while processing");
            return;
        }
        match command {
            Command::AddFiles(paths) => {
                if let Some(dir) = paths.first().and_then(|p| p.parent()) {
                    self.state.last_add_directory = dir.to_path_buf();
                }
                let added = self.state.images.add_paths(&paths);
                self.list_changed(format!("Added {added} image(s)."));
            }
            Command::AddFolder(folder) => self.add_folder(folder),
            Command::DropPaths(paths) => {
                let expanded = expand_inputs(&paths);
                let added = self.state.images.add_paths(&expanded.images);
                if added == 0 {
                    self.set_status("No new images found in dropped items.");
                } else {
                    self.list_changed(format!(
                        "Added {added} image(s) from drop ({} folder(s) scanned).",
                        expanded.folders_scanned
                    ));
                }
            }
            Command::RemoveEntries(indices) => {
                let removed = self.state.images.remove_indices(&indices);
                self.list_changed(format!("Removed {removed} image(s)."));
            }
            Command::ClearImages => {
                let removed = self.state.images.clear();
                self.list_changed(format!("Removed {removed} image(s)."));
            }
            Command::MoveEntry { from, to } => {
                if self.state.images.move_entry(from, to) {
                    self.list_changed("Item moved.".to_string());
                } else {
                    warn!(from, to, "move out of range");
                }
            }
            Command::Shuffle { seed } => {
                match seed {
                    Some(seed) => self.state.images.shuffle(&mut StdRng::seed_from_u64(seed)),
                    None => self.state.images.shuffle(&mut rand::rng()),
                }
                self.list_changed("Image order shuffled.".to_string());
            }
            Command::SortByName => {
                self.state.images.sort_by_name();
                self.list_changed("Images sorted by name.".to_string());
            }
            Command::SetDuration(value) => self.state.settings.duration = value,
            Command::SetProfile(value) => {
                if let Some(profile) = OutputProfile::from_name(&value) {
                    self.set_status(profile.description());
                }
                self.state.settings.profile = value;
            }
            Command::SetQuality(value) => self.state.settings.quality = value,
            Command::SetDownscaleEnabled(enabled) => {
                self.state.settings.downscale_enabled = enabled;
            }
            Command::SetDownscaleFactor(value) => self.state.settings.downscale_factor = value,
            Command::ApplyPreset(preset) => {
                let settings = &mut self.state.settings;
                settings.profile = preset.profile().display_name().to_string();
                settings.quality = preset.quality().to_string();
                settings.downscale_enabled = preset.downscale_enabled();
                settings.downscale_factor = preset.downscale_factor().to_string();
                self.set_status(preset.status());
            }
            Command::SetOutput(path) => {
                self.state.settings.output = Some(path);
                self.overwrite_confirmed = false;
            }
            Command::ConfirmOverwrite(confirmed) => self.overwrite_confirmed = confirmed,
            Command::StartEncode => self.start_encode(),
            Command::PollJob => self.poll_job(),
            Command::Shutdown => self.shutdown(),
        }
    }

    fn add_folder(&mut self, folder: PathBuf) {
        self.state.last_add_directory = folder.clone();
        let found = match scan_folder(&folder) {
            Ok(found) => found,
            Err(err) => {
                self.notice(NoticeLevel::Error, "Error", err.to_string());
                return;
            }
        };
        if found.is_empty() {
            self.notice(
                NoticeLevel::Info,
                "Info",
                format!("No image files found in '{}'.", folder.display()),
            );
            return;
        }
        let added = self.state.images.add_paths(&found);
        self.list_changed(format!(
            "Added {added} image(s) from '{}'.",
            folder.display()
        ));
    }

    fn start_encode(&mut self) {
        if self.state.images.is_empty() {
            self.notice(NoticeLevel::Error, "Error", "Please add images first.".into());
            return;
        }
        if self.job_active() {
            warn!("processing already in progress");
            self.set_status("Processing...");
            return;
        }

        let output = self.planned_output();
        let mut raw = self.state.settings.clone();
        raw.output = Some(output.clone());
        let config = match validate(&raw, &self.state.images.paths()) {
            Ok(config) => config,
            Err(err) => {
                info!(%err, "settings rejected");
                self.notice(NoticeLevel::Error, "Error", err.to_string());
                return;
            }
        };
        if output.exists() && !self.overwrite_confirmed {
            self.notice(
                NoticeLevel::Error,
                "Error",
                format!(
                    "Output file already exists:\n{}\n\nConfirm overwrite to replace it.",
                    output.display()
                ),
            );
            return;
        }

        self.set_interactive(false);
        self.set_title(format!("{APP_TITLE} - Processing..."));
        self.set_status("Preparing FFmpeg...");
        self.state.output_hint = Some(output.clone());
        self.save_preferences();

        match self.supervisor.begin(config, &self.encoder) {
            Ok(id) => {
                info!(job = %id, output = %output.display(), "starting video encoding");
                self.overwrite_confirmed = false;
                self.set_status("Starting FFmpeg...");
            }
            Err(err) => {
                error!(%err, "failed to prepare/start FFmpeg");
                self.notice(
                    NoticeLevel::Error,
                    "Error",
                    format!("Failed to prepare FFmpeg command: {err}"),
                );
                self.set_status("Error preparing FFmpeg.");
                self.restore_idle();
            }
        }
    }

    fn poll_job(&mut self) {
        let tick = self.supervisor.tick();
        if let Some(line) = tick.progress {
            self.set_status(format!("FFmpeg: {line}"));
        }
        if let Some(finished) = tick.finished {
            self.finish(finished);
        }
    }

    fn shutdown(&mut self) {
        info!("closing application, saving settings");
        if let Some(finished) = self.supervisor.shutdown() {
            self.finish(finished);
        }
        self.save_preferences();
    }

    fn finish(&mut self, finished: FinishedJob) {
        self.restore_idle();
        match &finished.outcome {
            JobOutcome::Succeeded { output } => {
                let took = humantime::format_duration(Duration::from_secs(
                    finished.elapsed.as_secs(),
                ));
                info!(output = %output.display(), %took, "slideshow created successfully");
                self.set_status(format!("Slideshow created successfully in {took}."));
                self.notice(
                    NoticeLevel::Info,
                    "Success",
                    format!("Slideshow created:\n{}", output.display()),
                );
            }
            JobOutcome::Failed(failure) => {
                error!(%failure, "FFmpeg error");
                self.notice(
                    NoticeLevel::Error,
                    "Error",
                    format!(
                        "Error creating video (FFmpeg failed).\nCodec: {}\n\nDetails: {failure}\n\nCheck log.",
                        finished.codec.encoder_name()
                    ),
                );
                self.set_status("Error creating video. Check log.");
            }
        }
        self.state.last_outcome = Some(finished);
    }

    fn restore_idle(&mut self) {
        self.set_interactive(true);
        self.set_title(APP_TITLE.to_string());
    }

    fn save_preferences(&mut self) {
        self.prefs.capture(
            &self.state.settings,
            self.state.output_hint.as_deref(),
            &self.state.last_add_directory,
        );
        config::save_or_warn(&self.prefs_path, &self.prefs);
    }

    fn list_changed(&mut self, status: String) {
        let len = self.state.images.len();
        self.publish(AppEvent::ListChanged { len });
        self.set_status(status);
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.state.status = status.into();
        self.publish(AppEvent::StatusChanged(self.state.status.clone()));
    }

    fn set_title(&mut self, title: String) {
        if self.state.title != title {
            self.state.title = title.clone();
            self.publish(AppEvent::TitleChanged(title));
        }
    }

    fn set_interactive(&mut self, interactive: bool) {
        if self.state.interactive != interactive {
            self.state.interactive = interactive;
            self.publish(AppEvent::InteractionChanged(interactive));
        }
    }

    fn notice(&mut self, level: NoticeLevel, title: &str, body: String) {
        self.publish(AppEvent::Notice {
            level,
            title: title.to_string(),
            body,
        });
    }

    fn publish(&mut self, event: AppEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Poll the active job on a fixed cadence until it settles or `cancel` fires.
///
/// `on_tick` runs after every poll. Cancellation terminates the encoder through
/// [`Command::Shutdown`].
pub async fn run_job_loop<F>(
    controller: &mut Controller,
    cancel: CancellationToken,
    mut on_tick: F,
) -> Option<FinishedJob>
where
    F: FnMut(&Controller),
{
    let mut ticker = interval_at(Instant::now() + INITIAL_POLL_DELAY, POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    while controller.job_active() {
        select! {
            _ = cancel.cancelled() => {
                info!("shutdown requested");
                controller.dispatch(Command::Shutdown);
                break;
            }
            _ = ticker.tick() => {
                controller.dispatch(Command::PollJob);
                on_tick(controller);
            }
        }
    }
    controller.state().last_outcome.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Source;

    fn controller(dir: &Path) -> Controller {
        let loaded = Loaded {
            prefs: Preferences::defaults(dir),
            source: Source::Defaults,
        };
        Controller::new(
            dir.join("ffmpeg"),
            dir.join("prefs.json"),
            dir.to_path_buf(),
            loaded,
        )
    }

    #[test]
    fn start_with_empty_list_raises_notice() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(dir.path());
        let events = ctl.subscribe();
        ctl.dispatch(Command::StartEncode);
        let got: Vec<AppEvent> = events.try_iter().collect();
        assert_eq!(
            got,
            vec![AppEvent::Notice {
                level: NoticeLevel::Error,
                title: "Error".into(),
                body: "Please add images first.".into(),
            }]
        );
        assert!(ctl.state().interactive);
        assert!(!ctl.job_active());
    }

    #[test]
    fn presets_update_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(dir.path());
        ctl.dispatch(Command::ApplyPreset(Preset::QualityWebm));
        let s = &ctl.state().settings;
        assert_eq!(s.profile, "AV1 - .webm");
        assert_eq!(s.quality, "24");
        assert!(!s.downscale_enabled);
        assert_eq!(s.downscale_factor, "1.0");
        assert_eq!(ctl.state().status, "Applied 'Quality WebM' preset (AV1).");
        assert_eq!(
            ctl.quality_hint(),
            QualityHint::Tier("High Quality / Med-Large File")
        );
    }

    #[test]
    fn list_commands_publish_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(dir.path());
        let events = ctl.subscribe();
        ctl.dispatch(Command::AddFiles(vec![
            PathBuf::from("/x/b.png"),
            PathBuf::from("/x/a.png"),
            PathBuf::from("/x/notes.txt"),
        ]));
        ctl.dispatch(Command::SortByName);
        ctl.dispatch(Command::RemoveEntries(vec![0]));
        let lens: Vec<usize> = events
            .try_iter()
            .filter_map(|e| match e {
                AppEvent::ListChanged { len } => Some(len),
                _ => None,
            })
            .collect();
        assert_eq!(lens, vec![2, 2, 1]);
        assert_eq!(ctl.state().images.first().map(|e| e.name()), Some("b.png"));
        assert_eq!(ctl.state().last_add_directory, PathBuf::from("/x"));
        assert_eq!(ctl.resolution_summary(), "(Error reading first image)");
    }

    #[test]
    fn validation_failure_keeps_ui_interactive() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(dir.path());
        ctl.dispatch(Command::AddFiles(vec![dir.path().join("a.png")]));
        ctl.dispatch(Command::SetDuration("0".into()));
        let events = ctl.subscribe();
        ctl.dispatch(Command::StartEncode);
        let notices: Vec<AppEvent> = events.try_iter().collect();
        assert!(matches!(
            notices.as_slice(),
            [AppEvent::Notice { level: NoticeLevel::Error, body, .. }] if body == "Delay must be positive."
        ));
        assert!(ctl.state().interactive);
        assert_eq!(ctl.state().title, APP_TITLE);
    }

    #[test]
    fn planned_output_enforces_container() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(dir.path());
        ctl.dispatch(Command::SetProfile("H.264 - .mp4".into()));
        ctl.dispatch(Command::SetOutput(dir.path().join("movie.webm")));
        assert_eq!(ctl.planned_output(), dir.path().join("movie.mp4"));
        ctl.dispatch(Command::SetOutput(dir.path().join("movie")));
        assert_eq!(ctl.planned_output(), dir.path().join("movie.mp4"));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(dir.path());
        drop(ctl.subscribe());
        let live = ctl.subscribe();
        ctl.dispatch(Command::SortByName);
        assert_eq!(ctl.subscribers.len(), 1);
        assert!(live.try_iter().count() >= 1);
    }
}
