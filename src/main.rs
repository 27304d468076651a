//! Command-line front end: builds the image list and settings from arguments, then
//! drives one encode through the controller.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, ValueEnum};
use crossbeam_channel::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rust_slideshow::app::{Command, Controller, run_job_loop};
use rust_slideshow::command::EncoderCommand;
use rust_slideshow::concat::render_script;
use rust_slideshow::events::{AppEvent, JobOutcome, NoticeLevel};
use rust_slideshow::profile::Preset;
use rust_slideshow::settings::validate;
use rust_slideshow::{config, encoder, logging};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    /// VP9, CRF 36, downscaled to half size
    Small,
    /// AV1, CRF 24, native size
    Quality,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Small => Preset::SmallWebm,
            PresetArg::Quality => Preset::QualityWebm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Order {
    /// As given on the command line
    Keep,
    /// Case-insensitive file name
    Name,
    Shuffle,
}

#[derive(Debug, Parser)]
#[command(
    name = "slideshow",
    version,
    about = "Turn still images into a slideshow video with ffmpeg"
)]
struct Args {
    /// Image files or folders (scanned recursively), in display order
    #[arg(value_name = "INPUTS")]
    inputs: Vec<PathBuf>,
    /// Seconds each image is shown
    #[arg(long, value_name = "SECONDS")]
    duration: Option<String>,
    /// Output profile: "VP9 - .webm", "AV1 - .webm" or "H.264 - .mp4"
    #[arg(long, value_name = "PROFILE")]
    profile: Option<String>,
    /// Constant rate factor (VP9/AV1: 0-63, H.264: 0-51)
    #[arg(long, value_name = "CRF")]
    crf: Option<String>,
    /// Downscale the first image's size by this factor, in (0, 1.0]
    #[arg(long, value_name = "FACTOR", conflicts_with = "no_downscale")]
    downscale: Option<String>,
    /// Encode at the first image's native size
    #[arg(long)]
    no_downscale: bool,
    /// Apply a settings preset before the individual overrides
    #[arg(long, value_enum)]
    preset: Option<PresetArg>,
    /// Reorder the images before encoding
    #[arg(long, value_enum, default_value_t = Order::Keep)]
    order: Order,
    /// Seed for --order shuffle
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Destination file (extension is forced to match the profile)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Overwrite an existing destination file
    #[arg(long)]
    force: bool,
    /// Path to the ffmpeg executable
    #[arg(long, value_name = "FILE")]
    encoder: Option<PathBuf>,
    /// Preferences file
    #[arg(long, value_name = "FILE")]
    prefs: Option<PathBuf>,
    /// Print the concat script and encoder command without running it
    #[arg(long)]
    dry_run: bool,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_path = logging::init(args.verbose)?;
    logging::install_panic_hook(log_path);

    let app_dir = config::app_directory();
    let encoder = encoder::locate(args.encoder.as_deref()).context("locating ffmpeg")?;
    let prefs_path = args
        .prefs
        .clone()
        .unwrap_or_else(|| config::default_path(&app_dir));
    let loaded = config::load(&prefs_path, &app_dir);
    info!(path = %prefs_path.display(), status = loaded.status(), "preferences");

    let mut controller = Controller::new(encoder, prefs_path, app_dir, loaded);
    let events = controller.subscribe();
    for command in setup_commands(&args) {
        controller.dispatch(command);
    }
    render(&events);

    if args.dry_run {
        return dry_run(&controller);
    }

    controller.dispatch(Command::StartEncode);
    render(&events);
    if !controller.job_active() {
        bail!("encoding did not start: {}", controller.state().status);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "failed to listen for ctrl-c");
            return;
        }
        on_signal.cancel();
    });

    let finished = run_job_loop(&mut controller, cancel, |_| render(&events)).await;
    render(&events);
    eprintln!();
    match finished.map(|f| f.outcome) {
        Some(JobOutcome::Succeeded { output }) => {
            println!("{}", output.display());
            Ok(())
        }
        Some(JobOutcome::Failed(failure)) => Err(anyhow!("encoding failed: {failure}")),
        None => bail!("encoder finished without a result"),
    }
}

/// Commands that turn the arguments into controller state, in application order.
fn setup_commands(args: &Args) -> Vec<Command> {
    let mut commands = Vec::new();
    if let Some(preset) = args.preset {
        commands.push(Command::ApplyPreset(preset.into()));
    }
    if let Some(duration) = &args.duration {
        commands.push(Command::SetDuration(duration.clone()));
    }
    if let Some(profile) = &args.profile {
        commands.push(Command::SetProfile(profile.clone()));
    }
    if let Some(crf) = &args.crf {
        commands.push(Command::SetQuality(crf.clone()));
    }
    if let Some(factor) = &args.downscale {
        commands.push(Command::SetDownscaleEnabled(true));
        commands.push(Command::SetDownscaleFactor(factor.clone()));
    }
    if args.no_downscale {
        commands.push(Command::SetDownscaleEnabled(false));
    }
    commands.push(Command::DropPaths(args.inputs.clone()));
    match args.order {
        Order::Keep => {}
        Order::Name => commands.push(Command::SortByName),
        Order::Shuffle => commands.push(Command::Shuffle { seed: args.seed }),
    }
    if let Some(output) = &args.output {
        commands.push(Command::SetOutput(output.clone()));
    }
    commands.push(Command::ConfirmOverwrite(args.force));
    commands
}

fn dry_run(controller: &Controller) -> Result<()> {
    let state = controller.state();
    let mut raw = state.settings.clone();
    raw.output = Some(controller.planned_output());
    let config = validate(&raw, &state.images.paths()).context("validating settings")?;
    let command = EncoderCommand::build(
        controller.encoder(),
        &config,
        std::path::Path::new("<concat-script>"),
    );

    let mut out = io::stdout().lock();
    writeln!(out, "# {}", controller.resolution_summary())?;
    writeln!(out, "# quality: {}", controller.quality_hint())?;
    out.write_all(&render_script(config.images(), config.per_image()))?;
    writeln!(out, "{}", command.display())?;
    Ok(())
}

fn render(events: &Receiver<AppEvent>) {
    for event in events.try_iter() {
        match event {
            AppEvent::StatusChanged(status) if status.starts_with("FFmpeg:") => {
                eprint!("\r{status}");
                let _ = io::stderr().flush();
            }
            AppEvent::StatusChanged(status) => eprintln!("{status}"),
            AppEvent::Notice {
                level: NoticeLevel::Info,
                title,
                body,
            } => println!("[{title}] {body}"),
            AppEvent::Notice {
                level: NoticeLevel::Error,
                title,
                body,
            } => eprintln!("\n[{title}] {body}"),
            other => debug!(?other, "event"),
        }
    }
}
