//! Session configuration
//!
//! A whole stimulation session is described by one TOML file: the audio
//! device settings, the scheduler timing, the source table and the plan.

use crate::audio::types::SampleFormat;
use crate::error::{Error, Result};
use crate::playback::plan::{ScheduledEvent, Termination};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Audio device configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name; None selects the system default
    pub device: Option<String>,

    /// Device output channel count
    pub channels: u16,

    /// Session sample format
    pub format: SampleFormat,

    /// Frame rate in Hz
    pub frame_rate: u32,

    /// Frames per hardware buffer (and per playback chunk)
    pub chunk_size: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            channels: 2,
            format: SampleFormat::Int16,
            frame_rate: 44100,
            chunk_size: 512,
        }
    }
}

/// Scheduler timing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Poll tick interval in microseconds; dispatch jitter is bounded by
    /// one tick
    pub tick_us: u64,

    /// Pause after the control loop exits, before the stream closes
    pub settle_ms: u64,

    /// How long to wait for the first audio callback after open
    pub clock_timeout_ms: u64,

    /// Termination mode: "auto", "none", or a horizon in seconds
    pub termination: TerminationSpec,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_us: 1000,
            settle_ms: 500,
            clock_timeout_ms: 5000,
            termination: TerminationSpec::Mode("auto".into()),
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_micros(self.tick_us)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn clock_timeout(&self) -> Duration {
        Duration::from_millis(self.clock_timeout_ms)
    }
}

/// Termination as written in the session file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TerminationSpec {
    /// "auto" or "none"
    Mode(String),
    /// Explicit horizon in seconds
    Seconds(f64),
}

impl TerminationSpec {
    pub fn resolve(&self) -> Result<Termination> {
        match self {
            TerminationSpec::Seconds(secs) => Ok(Termination::At(*secs)),
            TerminationSpec::Mode(mode) => match mode.as_str() {
                "auto" => Ok(Termination::Auto),
                "none" => Ok(Termination::NoLimit),
                other => Err(Error::Config(format!(
                    "unknown termination mode '{}' (expected \"auto\", \"none\", or seconds)",
                    other
                ))),
            },
        }
    }
}

/// Synthetic tone description
#[derive(Debug, Clone, Deserialize)]
pub struct ToneSpec {
    pub frequency: f64,
    pub duration: f64,
    #[serde(default = "default_tone_channels")]
    pub channels: u16,
}

fn default_tone_channels() -> u16 {
    1
}

/// One audio source: either a WAV file or a generated tone
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    pub id: u32,

    /// WAV file path (exclusive with `tone`)
    pub file: Option<PathBuf>,

    /// Generated tone (exclusive with `file`)
    pub tone: Option<ToneSpec>,

    /// Load-time gain
    #[serde(default = "default_gain")]
    pub gain: f32,

    /// Optional linear rise/fall window, ramp seconds per end
    pub window: Option<f64>,
}

fn default_gain() -> f32 {
    1.0
}

/// One plan entry as written in the session file
#[derive(Debug, Clone, Deserialize)]
pub struct PlanSpec {
    /// Trigger time in seconds from session start
    pub at: f64,

    /// Source id
    pub source: u32,

    /// Target output channels, 1-based
    pub channels: Vec<u16>,

    /// Marker value emitted at dispatch
    pub marker: u8,
}

/// Complete session description
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub audio: AudioConfig,
    pub scheduler: SchedulerConfig,
    pub sources: Vec<SourceSpec>,
    pub plan: Vec<PlanSpec>,
}

impl SessionConfig {
    /// Load a session description from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Plan entries in file order
    pub fn events(&self) -> Vec<ScheduledEvent> {
        self.plan
            .iter()
            .map(|entry| ScheduledEvent {
                onset: entry.at,
                source_id: entry.source,
                channels: entry.channels.clone(),
                marker: entry.marker,
            })
            .collect()
    }
}
