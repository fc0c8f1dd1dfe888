//! Audio device session using cpal
//!
//! Owns the hardware stream for one playback session. The mixing engine is
//! injected into the output callback at open time and scoped to the
//! session; the callback also publishes a monotonic clock reading on every
//! invocation, which the scheduler polls to time its dispatches.

use crate::audio::types::{Pcm, PcmBuffer};
use crate::config::AudioConfig;
use crate::error::{Error, Result};
use crate::playback::mixer::Mixer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Sentinel for "no callback has fired yet"
const CLOCK_UNAVAILABLE: u64 = u64::MAX;

/// Monotonic session clock published from the audio callback.
///
/// Readings are nanoseconds on a monotonic timeline private to this clock;
/// only differences between readings are meaningful. Not valid until the
/// stream has produced at least one callback.
pub struct SessionClock {
    epoch: Instant,

    /// Most recent callback reading, or `CLOCK_UNAVAILABLE`
    nanos: AtomicU64,

    /// Reported output latency (playback minus callback timestamp)
    latency_nanos: AtomicU64,

    /// Callback invocations since the last reset
    callbacks: AtomicU64,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            nanos: AtomicU64::new(CLOCK_UNAVAILABLE),
            latency_nanos: AtomicU64::new(0),
            callbacks: AtomicU64::new(0),
        }
    }

    /// Invalidate the clock; called when a session opens or closes
    pub fn reset(&self) {
        self.nanos.store(CLOCK_UNAVAILABLE, Ordering::Release);
        self.callbacks.store(0, Ordering::Relaxed);
    }

    /// Publish a fresh reading; called once per audio callback
    pub fn mark(&self, output_latency: Option<Duration>) {
        if let Some(latency) = output_latency {
            self.latency_nanos
                .store(latency.as_nanos() as u64, Ordering::Relaxed);
        }
        self.nanos
            .store(self.epoch.elapsed().as_nanos() as u64, Ordering::Release);
        self.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent reading, or None before the first callback
    pub fn now(&self) -> Option<Duration> {
        let nanos = self.nanos.load(Ordering::Acquire);
        if nanos == CLOCK_UNAVAILABLE {
            None
        } else {
            Some(Duration::from_nanos(nanos))
        }
    }

    /// Last reported output latency
    pub fn output_latency(&self) -> Duration {
        Duration::from_nanos(self.latency_nanos.load(Ordering::Relaxed))
    }

    /// Callback invocations since the last reset
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// One output device with its capabilities, for device listing
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub max_channels: u16,
}

/// Playback session seam between the scheduler and the audio hardware.
///
/// Implemented by [`DeviceSession`] for real output and by test doubles in
/// the integration tests.
pub trait AudioSession<T: Pcm> {
    /// Start the hardware stream; resets engine state
    fn open(&mut self) -> Result<()>;

    /// Stop and release the stream; `now`/`play` are invalid afterwards
    fn close(&mut self);

    /// Most recent hardware clock reading, None before the first callback
    fn now(&self) -> Option<Duration>;

    /// Begin playing `source` on the given 1-based output channels
    fn play(&mut self, source: Arc<PcmBuffer<T>>, channels: &[u16]) -> Result<()>;

    /// True when the stream has reported a fault; the session is then
    /// treated as terminated
    fn faulted(&self) -> bool {
        false
    }
}

/// Audio session over a cpal output device
pub struct DeviceSession<T: Pcm> {
    device: cpal::Device,
    config: cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer<T>>>,
    clock: Arc<SessionClock>,
    error_flag: Arc<AtomicBool>,
    stream: Option<cpal::Stream>,
}

impl<T: Pcm> std::fmt::Debug for DeviceSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Pcm> DeviceSession<T> {
    /// Open the configured device for later streaming.
    ///
    /// Unknown device names, unsupported sample formats and channel counts
    /// the device cannot provide are all reported here as configuration
    /// errors; no fallback device is substituted.
    pub fn new(cfg: &AudioConfig) -> Result<Self> {
        if cfg.format != <T as Pcm>::FORMAT {
            return Err(Error::Config(format!(
                "session sample type is {}, configuration says {}",
                <T as Pcm>::FORMAT,
                cfg.format
            )));
        }

        let host = cpal::default_host();
        let device = match cfg.device.as_deref() {
            Some(name) => host
                .output_devices()
                .map_err(|e| Error::Device(format!("failed to enumerate devices: {}", e)))?
                .find(|d| d.name().ok().as_deref() == Some(name))
                .ok_or_else(|| Error::Config(format!("audio device '{}' not found", name)))?,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::Config("no default output device".into()))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());
        info!("Using audio device: {}", device_name);

        let wanted = cfg.format.as_cpal();
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Device(format!("failed to query device configs: {}", e)))?
            .any(|range| {
                range.channels() == cfg.channels
                    && range.sample_format() == wanted
                    && range.min_sample_rate().0 <= cfg.frame_rate
                    && range.max_sample_rate().0 >= cfg.frame_rate
            });
        if !supported {
            return Err(Error::Config(format!(
                "device '{}' does not support {} ch {} at {} Hz",
                device_name, cfg.channels, cfg.format, cfg.frame_rate
            )));
        }

        let config = cpal::StreamConfig {
            channels: cfg.channels,
            sample_rate: cpal::SampleRate(cfg.frame_rate),
            buffer_size: cpal::BufferSize::Fixed(cfg.chunk_size),
        };
        debug!(
            "Stream config: {} ch, {} Hz, {} frames/chunk, {}",
            cfg.channels, cfg.frame_rate, cfg.chunk_size, cfg.format
        );

        Ok(Self {
            device,
            config,
            mixer: Arc::new(Mutex::new(Mixer::new(cfg.channels, cfg.chunk_size as usize))),
            clock: Arc::new(SessionClock::new()),
            error_flag: Arc::new(AtomicBool::new(false)),
            stream: None,
        })
    }

    /// Session clock handle, for observers
    pub fn clock(&self) -> Arc<SessionClock> {
        Arc::clone(&self.clock)
    }
}

impl<T: Pcm> AudioSession<T> for DeviceSession<T> {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::InvalidState("session is already open".into()));
        }

        self.mixer.lock().unwrap().reset();
        self.clock.reset();
        self.error_flag.store(false, Ordering::SeqCst);

        let mixer = Arc::clone(&self.mixer);
        let clock = Arc::clone(&self.clock);
        let error_flag = Arc::clone(&self.error_flag);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                    let ts = info.timestamp();
                    clock.mark(ts.playback.duration_since(&ts.callback));
                    mixer.lock().unwrap().mix_into(data);
                },
                move |err| {
                    error!("Audio stream fault: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::Device(format!("failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::Device(format!("failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        info!("Audio stream started");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream on close: {}", e);
            }
            drop(stream);
            info!(
                "Audio stream closed after {} callbacks",
                self.clock.callbacks()
            );
        }
        self.clock.reset();
    }

    fn now(&self) -> Option<Duration> {
        self.clock.now()
    }

    fn play(&mut self, source: Arc<PcmBuffer<T>>, channels: &[u16]) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::InvalidState("session is not open".into()));
        }
        self.mixer.lock().unwrap().play(source, channels)
    }

    fn faulted(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }
}

impl<T: Pcm> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// List available output devices with their maximum channel counts
pub fn list_output_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    for device in host
        .output_devices()
        .map_err(|e| Error::Device(format!("failed to enumerate devices: {}", e)))?
    {
        let Ok(name) = device.name() else { continue };
        let max_channels = device
            .supported_output_configs()
            .map(|configs| configs.map(|range| range.channels()).max().unwrap_or(0))
            .unwrap_or(0);
        if max_channels > 0 {
            devices.push(DeviceInfo { name, max_channels });
        }
    }

    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::SampleFormat;

    #[test]
    fn test_clock_unavailable_until_marked() {
        let clock = SessionClock::new();
        assert_eq!(clock.now(), None);

        clock.mark(None);
        assert!(clock.now().is_some());
        assert_eq!(clock.callbacks(), 1);
    }

    #[test]
    fn test_clock_readings_are_monotonic() {
        let clock = SessionClock::new();
        clock.mark(None);
        let first = clock.now().unwrap();
        std::thread::sleep(Duration::from_millis(2));
        clock.mark(Some(Duration::from_millis(5)));
        let second = clock.now().unwrap();

        assert!(second > first);
        assert_eq!(clock.output_latency(), Duration::from_millis(5));
    }

    #[test]
    fn test_clock_reset_invalidates() {
        let clock = SessionClock::new();
        clock.mark(None);
        clock.reset();
        assert_eq!(clock.now(), None);
        assert_eq!(clock.callbacks(), 0);
    }

    #[test]
    fn test_session_rejects_format_mismatch() {
        let cfg = AudioConfig {
            format: SampleFormat::Uint8,
            ..AudioConfig::default()
        };
        // Checked before any device access
        let err = DeviceSession::<i16>::new(&cfg).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_list_devices_does_not_panic() {
        // Hardware-dependent; either outcome is acceptable
        let _ = list_output_devices();
    }
}
