//! Audio source store
//!
//! Holds loaded and generated PCM buffers keyed by a numeric source id.
//! Buffers are registered once (duplicate ids are a data error) and handed
//! to playback slots as `Arc` references for the session's lifetime.

use crate::audio::types::{Pcm, PcmBuffer};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// In-memory store of audio sources for one session
pub struct AudioStore<T> {
    sources: HashMap<u32, Arc<PcmBuffer<T>>>,
    frame_rate: u32,
}

impl<T: Pcm> AudioStore<T> {
    /// Create an empty store for the given session frame rate
    pub fn new(frame_rate: u32) -> Self {
        Self {
            sources: HashMap::new(),
            frame_rate,
        }
    }

    /// Session frame rate in Hz
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when no sources are registered
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Load a WAV file and register it under `id`.
    ///
    /// Only 16-bit signed / 8-bit unsigned integer PCM matching the session
    /// sample format is accepted. `gain` scales the raw sample values at
    /// load time.
    ///
    /// # Errors
    /// - Duplicate `id` (data error)
    /// - Unsupported sample width or format
    /// - I/O or WAV decoding failures
    pub fn load(&mut self, id: u32, path: impl AsRef<Path>, gain: f32) -> Result<()> {
        self.check_new_id(id)?;

        let path = path.as_ref();
        let start = Instant::now();
        debug!("Loading audio source {} from {}", id, path.display());

        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        if spec.sample_rate != self.frame_rate {
            // No sample-rate conversion: the file will play at the session
            // rate, shifted in pitch and duration.
            warn!(
                "Source {}: file rate {} Hz differs from session rate {} Hz",
                id, spec.sample_rate, self.frame_rate
            );
        }

        let mut samples = T::read_wav(&mut reader)?;
        if gain != 1.0 {
            for sample in &mut samples {
                *sample = sample.scale(gain);
            }
        }

        let buffer = PcmBuffer::from_samples(samples, spec.channels)?;
        info!(
            "Loaded source {}: {} frames, {} ch, gain {:.2} ({:.1} ms)",
            id,
            buffer.frames,
            buffer.channels,
            gain,
            start.elapsed().as_secs_f64() * 1000.0
        );

        self.sources.insert(id, Arc::new(buffer));
        Ok(())
    }

    /// Register an externally built PCM buffer under `id`
    pub fn add_pcm(&mut self, id: u32, buffer: PcmBuffer<T>) -> Result<()> {
        self.check_new_id(id)?;
        debug!(
            "Registered PCM source {}: {} frames, {} ch",
            id, buffer.frames, buffer.channels
        );
        self.sources.insert(id, Arc::new(buffer));
        Ok(())
    }

    /// Apply a linear rise/fall window to a registered source, in place.
    ///
    /// The ramp spans `rise_fall_secs` at each end; the middle is left
    /// untouched. Must be called before playback starts (the buffer may not
    /// be shared with a slot yet).
    pub fn apply_window(&mut self, id: u32, rise_fall_secs: f64) -> Result<()> {
        let frame_rate = self.frame_rate;
        let buffer = self
            .sources
            .get_mut(&id)
            .ok_or_else(|| Error::Data(format!("source id {} does not exist", id)))?;
        let buffer = Arc::get_mut(buffer).ok_or_else(|| {
            Error::InvalidState(format!("source {} is already in use by a playback slot", id))
        })?;

        let ramp = (rise_fall_secs * frame_rate as f64) as usize;
        apply_linear_window(buffer, ramp)
    }

    /// Buffer registered under `id`, shared
    pub fn get(&self, id: u32) -> Result<Arc<PcmBuffer<T>>> {
        self.sources
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Data(format!("source id {} does not exist", id)))
    }

    /// True when `id` is registered
    pub fn contains(&self, id: u32) -> bool {
        self.sources.contains_key(&id)
    }

    /// Frame count of a registered source
    pub fn frames_of(&self, id: u32) -> Result<usize> {
        Ok(self.get(id)?.frames)
    }

    /// Duration of a registered source in seconds at the session rate
    pub fn duration_of(&self, id: u32) -> Result<f64> {
        Ok(self.get(id)?.duration_seconds(self.frame_rate))
    }

    fn check_new_id(&self, id: u32) -> Result<()> {
        if self.sources.contains_key(&id) {
            Err(Error::Data(format!("source id {} is duplicated", id)))
        } else {
            Ok(())
        }
    }
}

/// Multiply the head and tail of `buffer` by linear ramps of `ramp` frames.
///
/// The rise reaches full scale on its last frame; the fall starts at full
/// scale and ends one step above zero.
pub(crate) fn apply_linear_window<T: Pcm>(buffer: &mut PcmBuffer<T>, ramp: usize) -> Result<()> {
    if ramp == 0 {
        return Ok(());
    }
    if buffer.frames < 2 * ramp {
        return Err(Error::Data(format!(
            "window of 2x{} frames does not fit a {}-frame source",
            ramp, buffer.frames
        )));
    }

    let channels = buffer.channels as usize;
    let frames = buffer.frames;

    for frame in 0..ramp {
        // arange(0, n) / (n - 1): 0 at the first frame, 1.0 at the last
        let w = if ramp > 1 {
            frame as f32 / (ramp - 1) as f32
        } else {
            1.0
        };
        for ch in 0..channels {
            let s = &mut buffer.samples[frame * channels + ch];
            *s = s.scale(w);
        }
    }

    for step in 0..ramp {
        // arange(n, 0, -1) / n: 1.0 down to 1/n, never fully zero
        let w = (ramp - step) as f32 / ramp as f32;
        let frame = frames - ramp + step;
        for ch in 0..channels {
            let s = &mut buffer.samples[frame * channels + ch];
            *s = s.scale(w);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, samples: &[i16], channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = AudioStore::<i16>::new(44100);
        let buffer = PcmBuffer::from_samples(vec![1i16, 2], 1).unwrap();
        store.add_pcm(1, buffer.clone()).unwrap();
        let err = store.add_pcm(1, buffer).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }

    #[test]
    fn test_missing_id_is_data_error() {
        let store = AudioStore::<i16>::new(44100);
        assert!(matches!(store.get(7), Err(Error::Data(_))));
        assert!(!store.contains(7));
    }

    #[test]
    fn test_load_wav_applies_gain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");
        write_test_wav(&path, &[1000, -1000, 2000, -2000], 2);

        let mut store = AudioStore::<i16>::new(44100);
        store.load(1, &path, 0.5).unwrap();

        let buffer = store.get(1).unwrap();
        assert_eq!(buffer.channels, 2);
        assert_eq!(buffer.frames, 2);
        assert_eq!(buffer.samples, vec![500, -500, 1000, -1000]);
    }

    #[test]
    fn test_load_wrong_width_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test8.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0i8).unwrap();
        writer.finalize().unwrap();

        let mut store = AudioStore::<i16>::new(44100);
        let err = store.load(1, &path, 1.0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_load_u8_recovers_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test8.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // Raw unsigned bytes 0, 128, 255 stored as offset values
        for v in [-128i8, 0, 127] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let mut store = AudioStore::<u8>::new(44100);
        store.load(1, &path, 1.0).unwrap();
        assert_eq!(store.get(1).unwrap().samples, vec![0u8, 128, 255]);
    }

    #[test]
    fn test_duration_of() {
        let mut store = AudioStore::<i16>::new(1000);
        let buffer = PcmBuffer::from_samples(vec![0i16; 1500], 1).unwrap();
        store.add_pcm(3, buffer).unwrap();
        assert_eq!(store.duration_of(3).unwrap(), 1.5);
        assert_eq!(store.frames_of(3).unwrap(), 1500);
    }

    #[test]
    fn test_apply_window_ramps_edges() {
        let mut store = AudioStore::<i16>::new(1000);
        let buffer = PcmBuffer::from_samples(vec![10000i16; 10], 1).unwrap();
        store.add_pcm(1, buffer).unwrap();
        // 3 ms ramp at 1 kHz = 3 frames each end
        store.apply_window(1, 0.003).unwrap();

        let buffer = store.get(1).unwrap();
        // Rise: 0, 1/2, 1 of full scale
        assert_eq!(buffer.samples[0], 0);
        assert_eq!(buffer.samples[1], 5000);
        assert_eq!(buffer.samples[2], 10000);
        // Middle untouched
        assert_eq!(buffer.samples[5], 10000);
        // Fall: 3/3, 2/3, 1/3 of full scale
        assert_eq!(buffer.samples[7], 10000);
        assert_eq!(buffer.samples[8], 6666);
        assert_eq!(buffer.samples[9], 3333);
    }

    #[test]
    fn test_apply_window_too_long_rejected() {
        let mut store = AudioStore::<i16>::new(1000);
        let buffer = PcmBuffer::from_samples(vec![100i16; 4], 1).unwrap();
        store.add_pcm(1, buffer).unwrap();
        assert!(store.apply_window(1, 0.01).is_err());
    }

    #[test]
    fn test_apply_window_shared_buffer_rejected() {
        let mut store = AudioStore::<i16>::new(1000);
        let buffer = PcmBuffer::from_samples(vec![100i16; 10], 1).unwrap();
        store.add_pcm(1, buffer).unwrap();
        let _held = store.get(1).unwrap();
        assert!(matches!(
            store.apply_window(1, 0.001),
            Err(Error::InvalidState(_))
        ));
    }
}
