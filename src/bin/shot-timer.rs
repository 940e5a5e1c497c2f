use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use shot_timer::audio::{FramePull, FrameSource, MicCapture, WavFrameSource};
use shot_timer::clock::{Clock, ManualClock, SystemClock};
use shot_timer::config::AppConfig;
use shot_timer::error::log_audio_error;
use shot_timer::{init_logging, EngineEvent, SessionEngine};

#[derive(Parser, Debug)]
#[command(
    name = "shot-timer",
    about = "Acoustic shot timer with adaptive impulse detection"
)]
struct Cli {
    /// Configuration file (JSON); invalid or missing files fall back to
    /// defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Sensitivity slider override in [0, 1]
    #[arg(long)]
    sensitivity: Option<f32>,
    /// Shot cooldown override in milliseconds
    #[arg(long)]
    cooldown_ms: Option<f64>,
    /// Minimum-silence-before-shot override in milliseconds
    #[arg(long)]
    silence_ms: Option<f64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a live timed session from the default microphone
    Run,
    /// Calibrate the threshold from reference shots, then run live
    Calibrate,
    /// Replay a pre-recorded WAV clip deterministically
    Clip {
        /// Path to the clip
        path: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::default(),
    };
    let mut engine = SessionEngine::new(config);

    if let Some(sensitivity) = cli.sensitivity {
        engine.set_sensitivity(sensitivity);
    }
    if let Some(cooldown_ms) = cli.cooldown_ms {
        engine.set_shot_cooldown_ms(cooldown_ms);
    }
    if let Some(silence_ms) = cli.silence_ms {
        engine.set_min_silence_ms(silence_ms);
    }

    match cli.command {
        Commands::Run => run_live(engine, false).await,
        Commands::Calibrate => run_live(engine, true).await,
        Commands::Clip { path } => run_clip(engine, &path),
    }
}

/// Print session events and fire follow-up actions they imply.
fn handle_events(
    rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>,
    engine: &mut SessionEngine,
    now_ms: f64,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::StatusChanged(status) => println!("{}", status.label()),
            EngineEvent::ShotRegistered {
                index,
                elapsed_s,
                split_s,
            } => match split_s {
                None => println!("First Shot: {:.2}s", elapsed_s),
                Some(split) => println!("Split {}: {:.2}s", index, split),
            },
            EngineEvent::CalibrationShotCaptured {
                shots_collected,
                shots_required,
                peak,
            } => println!(
                "Calibration shot {}/{} (peak {:.2})",
                shots_collected, shots_required, peak
            ),
            EngineEvent::CalibrationComplete { threshold } => {
                println!("Calibration complete, threshold {:.3}", threshold);
                engine.start_timer(now_ms);
            }
            EngineEvent::ThresholdChanged(threshold) => {
                log::debug!("[Main] Threshold now {:.3}", threshold);
            }
            EngineEvent::ParElapsed => println!("Par time elapsed"),
        }
    }
}

fn print_results(engine: &SessionEngine) {
    let lines = engine.timer().format_results();
    if lines.is_empty() {
        println!("No shots recorded");
        return;
    }
    println!("--- Session results ({} shots) ---", lines.len());
    for line in lines {
        println!("{}", line);
    }
}

async fn run_live(mut engine: SessionEngine, calibrate: bool) -> Result<()> {
    let frame_size = engine.config().audio.frame_size;
    let clock = SystemClock::new();
    let mut rx = engine.subscribe();

    engine.request_microphone();
    let (mut capture, mut source) =
        MicCapture::open(frame_size).context("opening microphone capture")?;
    capture.start().context("starting capture stream")?;

    if calibrate {
        engine.start_calibration()?;
        println!(
            "Fire {} reference shots",
            engine.config().calibration.shots_required
        );
    } else {
        engine.start_timer(clock.now_ms());
    }

    let mut frame = vec![0u8; frame_size];
    let mut ticker = tokio::time::interval(Duration::from_millis(16));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ms = clock.now_ms();
                match source.next_frame(&mut frame) {
                    Ok(FramePull::Frame) => {
                        engine.process_tick(&frame, now_ms);
                    }
                    Ok(FramePull::Pending) => {}
                    Ok(FramePull::Finished) => break,
                    Err(err) => {
                        log_audio_error(&err, "live session");
                        return Err(err.into());
                    }
                }
                handle_events(&mut rx, &mut engine, now_ms);
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    if let Err(err) = capture.stop() {
        log_audio_error(&err, "capture shutdown");
    }
    print_results(&engine);
    Ok(())
}

fn run_clip(mut engine: SessionEngine, path: &PathBuf) -> Result<()> {
    let frame_size = engine.config().audio.frame_size;
    let mut source = WavFrameSource::open(path, frame_size)
        .with_context(|| format!("loading clip {:?}", path))?;
    let tick_ms = source.tick_interval_ms();

    let clock = ManualClock::new();
    let mut rx = engine.subscribe();
    engine.start_timer(clock.now_ms());

    let mut frame = vec![0u8; frame_size];
    loop {
        match source.next_frame(&mut frame)? {
            FramePull::Frame => {
                engine.process_tick(&frame, clock.now_ms());
                handle_events(&mut rx, &mut engine, clock.now_ms());
                clock.advance(tick_ms);
            }
            FramePull::Pending => clock.advance(tick_ms),
            FramePull::Finished => break,
        }
    }

    print_results(&engine);
    Ok(())
}
