//! scab - Main entry point
//!
//! Runs one auditory stimulation session described by a TOML file: loads
//! or synthesizes the sources, opens the audio device, and lets the
//! scheduler dispatch the plan. Emitted markers are logged; Ctrl+C
//! requests cooperative cancellation through the shared run state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scab::audio::{list_output_devices, synth, AudioStore, DeviceSession, Pcm, SampleFormat};
use scab::config::SessionConfig;
use scab::playback::{RunState, Scheduler};

/// Command-line arguments for scab
#[derive(Parser, Debug)]
#[command(name = "scab")]
#[command(about = "Stimulation controller for auditory BCI experiments")]
#[command(version)]
struct Args {
    /// Session description file (TOML)
    #[arg(short, long, env = "SCAB_SESSION")]
    config: Option<PathBuf>,

    /// Override the output device named in the session file
    #[arg(short, long, env = "SCAB_DEVICE")]
    device: Option<String>,

    /// List available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scab=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list_devices {
        for device in list_output_devices().context("Failed to enumerate audio devices")? {
            println!(
                "name: '{}', max output channels: {}",
                device.name, device.max_channels
            );
        }
        return Ok(());
    }

    let Some(path) = args.config else {
        bail!("a session file is required: scab --config <session.toml> (or --list-devices)");
    };

    let mut cfg = SessionConfig::load(&path)
        .with_context(|| format!("Failed to load session file {}", path.display()))?;
    if let Some(device) = args.device {
        cfg.audio.device = Some(device);
    }

    info!(
        "Session: {} sources, {} plan entries, {} ch {} at {} Hz",
        cfg.sources.len(),
        cfg.plan.len(),
        cfg.audio.channels,
        cfg.audio.format,
        cfg.audio.frame_rate
    );

    match cfg.audio.format {
        SampleFormat::Int16 => run_session::<i16>(cfg).await,
        SampleFormat::Uint8 => run_session::<u8>(cfg).await,
    }
}

/// Run one session in the configured sample format
async fn run_session<T: Pcm>(cfg: SessionConfig) -> Result<()> {
    let store = build_store::<T>(&cfg)?;
    let termination = cfg.scheduler.termination.resolve()?;
    let plan = cfg.events();

    let mut session =
        DeviceSession::<T>::new(&cfg.audio).context("Failed to open audio device")?;

    let state = RunState::new();
    let scheduler = Scheduler::new(&cfg.scheduler, Arc::clone(&state));

    // Ctrl+C requests cooperative cancellation; the scheduler notices at
    // its next tick and drains before closing the device.
    let ctrl_state = Arc::clone(&state);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling session");
            ctrl_state.request_stop();
        }
    });

    let mut marker_sink = |marker: u8| info!("Marker sent: {}", marker);

    scheduler
        .play(&mut session, &store, plan, termination, &mut marker_sink)
        .await
        .context("Session failed")?;

    Ok(())
}

/// Build the audio store from the session's source table
fn build_store<T: Pcm>(cfg: &SessionConfig) -> Result<AudioStore<T>> {
    let mut store = AudioStore::new(cfg.audio.frame_rate);

    for source in &cfg.sources {
        match (&source.file, &source.tone) {
            (Some(path), None) => {
                store
                    .load(source.id, path, source.gain)
                    .with_context(|| format!("Failed to load source {}", source.id))?;
                if let Some(window) = source.window {
                    store.apply_window(source.id, window)?;
                }
            }
            (None, Some(tone)) => {
                let buffer = synth::tone::<T>(
                    tone.channels,
                    tone.frequency,
                    tone.duration,
                    source.gain,
                    cfg.audio.frame_rate,
                    source.window,
                )?;
                store.add_pcm(source.id, buffer)?;
            }
            _ => bail!(
                "source {}: exactly one of `file` or `tone` must be given",
                source.id
            ),
        }
    }

    Ok(store)
}
