//! Core audio data types
//!
//! Defines the PCM sample abstraction and the in-memory buffer format used
//! throughout the playback pipeline.
//!
//! **Format:**
//! - Samples are fixed-width integers (16-bit signed or 8-bit unsigned)
//! - Interleaved by frame: [ch0, ch1, ch0, ch1, ...]
//! - Mixing accumulates in the native integer type with wraparound on
//!   overflow

use crate::error::{Error, Result};
use serde::Deserialize;

/// Session-wide PCM sample format.
///
/// Only the two formats the stimulation hardware path supports; anything
/// else is rejected at load/open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 16-bit signed integer PCM
    Int16,
    /// 8-bit unsigned integer PCM
    Uint8,
}

impl SampleFormat {
    /// Corresponding cpal stream sample format
    pub fn as_cpal(self) -> cpal::SampleFormat {
        match self {
            SampleFormat::Int16 => cpal::SampleFormat::I16,
            SampleFormat::Uint8 => cpal::SampleFormat::U8,
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleFormat::Int16 => write!(f, "int16"),
            SampleFormat::Uint8 => write!(f, "uint8"),
        }
    }
}

/// PCM sample type usable by the playback engine.
///
/// The engine is generic over this trait so the mixer accumulates in the
/// sample's native integer type; the session format is chosen once from
/// configuration and dispatched at open.
pub trait Pcm:
    cpal::SizedSample + Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static
{
    /// Format tag for device negotiation and config checks
    const FORMAT: SampleFormat;

    /// Output value written where no slot contributes.
    ///
    /// Zero for both formats, including uint8, whose encoding midpoint
    /// would otherwise be 128.
    const SILENCE: Self;

    /// Additive mix of two samples in the native integer type.
    ///
    /// Wraps on overflow; no saturation is performed.
    fn mix(self, other: Self) -> Self;

    /// Convert a normalized sample in [-1.0, 1.0] to the native encoding
    fn from_norm(x: f32) -> Self;

    /// Scale the raw stored value by a gain factor (load-time volume)
    fn scale(self, gain: f32) -> Self;

    /// Read all samples of a WAV file in this format.
    ///
    /// Fails with [`Error::UnsupportedFormat`] when the file's sample
    /// width does not match.
    fn read_wav<R: std::io::Read>(reader: &mut hound::WavReader<R>) -> Result<Vec<Self>>;
}

impl Pcm for i16 {
    const FORMAT: SampleFormat = SampleFormat::Int16;
    const SILENCE: i16 = 0;

    #[inline]
    fn mix(self, other: i16) -> i16 {
        self.wrapping_add(other)
    }

    #[inline]
    fn from_norm(x: f32) -> i16 {
        (x * 32767.0) as i16
    }

    #[inline]
    fn scale(self, gain: f32) -> i16 {
        (self as f32 * gain) as i16
    }

    fn read_wav<R: std::io::Read>(reader: &mut hound::WavReader<R>) -> Result<Vec<i16>> {
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(Error::UnsupportedFormat(format!(
                "expected 16-bit signed PCM, file is {}-bit {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }
        reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::Wav)
    }
}

impl Pcm for u8 {
    const FORMAT: SampleFormat = SampleFormat::Uint8;
    const SILENCE: u8 = 0;

    #[inline]
    fn mix(self, other: u8) -> u8 {
        self.wrapping_add(other)
    }

    #[inline]
    fn from_norm(x: f32) -> u8 {
        // Offset binary: -1.0 -> 0, 0.0 -> ~128, 1.0 -> 255
        (((x * 0.5) + 0.5) * 255.0) as u8
    }

    #[inline]
    fn scale(self, gain: f32) -> u8 {
        (self as f32 * gain) as u8
    }

    fn read_wav<R: std::io::Read>(reader: &mut hound::WavReader<R>) -> Result<Vec<u8>> {
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 8 {
            return Err(Error::UnsupportedFormat(format!(
                "expected 8-bit unsigned PCM, file is {}-bit {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }
        // hound presents 8-bit unsigned storage as offset signed values;
        // undo the offset to recover the raw unsigned bytes.
        reader
            .samples::<i16>()
            .map(|s| s.map(|v| (v + 128) as u8).map_err(Error::Wav))
            .collect()
    }
}

/// PcmBuffer holds one loaded or generated audio source in RAM.
///
/// Immutable once registered with the store; playback slots reference it
/// through an `Arc`, never by copy.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer<T> {
    /// PCM samples, interleaved by frame
    pub samples: Vec<T>,

    /// Source channel count
    pub channels: u16,

    /// Number of frames (samples.len() / channels)
    pub frames: usize,
}

impl<T: Pcm> PcmBuffer<T> {
    /// Create a buffer from interleaved samples
    ///
    /// # Errors
    /// Returns a data error when `channels` is zero or the sample count is
    /// not a whole number of frames.
    pub fn from_samples(samples: Vec<T>, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(Error::Data("PCM buffer needs at least one channel".into()));
        }
        if samples.len() % channels as usize != 0 {
            return Err(Error::Data(format!(
                "sample count {} is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }
        let frames = samples.len() / channels as usize;
        Ok(Self {
            samples,
            channels,
            frames,
        })
    }

    /// Duration in seconds at the given frame rate
    pub fn duration_seconds(&self, frame_rate: u32) -> f64 {
        self.frames as f64 / frame_rate as f64
    }

    /// Sample at (frame, channel); caller guarantees bounds
    #[inline]
    pub fn sample(&self, frame: usize, channel: u16) -> T {
        self.samples[frame * self.channels as usize + channel as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_from_samples() {
        let buffer = PcmBuffer::from_samples(vec![1i16, 2, 3, 4], 2).unwrap();
        assert_eq!(buffer.frames, 2);
        assert_eq!(buffer.sample(0, 0), 1);
        assert_eq!(buffer.sample(0, 1), 2);
        assert_eq!(buffer.sample(1, 0), 3);
        assert_eq!(buffer.sample(1, 1), 4);
    }

    #[test]
    fn test_buffer_rejects_ragged_samples() {
        assert!(PcmBuffer::from_samples(vec![1i16, 2, 3], 2).is_err());
        assert!(PcmBuffer::from_samples(Vec::<i16>::new(), 0).is_err());
    }

    #[test]
    fn test_buffer_duration() {
        let buffer = PcmBuffer::from_samples(vec![0i16; 44100 * 2], 2).unwrap();
        assert_eq!(buffer.duration_seconds(44100), 1.0);
    }

    #[test]
    fn test_i16_mix_wraps() {
        assert_eq!(<i16 as Pcm>::mix(100, -30), 70);
        // Wraparound, not saturation
        assert_eq!(<i16 as Pcm>::mix(i16::MAX, 1), i16::MIN);
    }

    #[test]
    fn test_u8_mix_wraps() {
        assert_eq!(<u8 as Pcm>::mix(200, 55), 255);
        assert_eq!(<u8 as Pcm>::mix(200, 56), 0);
    }

    #[test]
    fn test_from_norm_full_scale() {
        assert_eq!(<i16 as Pcm>::from_norm(1.0), 32767);
        assert_eq!(<i16 as Pcm>::from_norm(-1.0), -32767);
        assert_eq!(<i16 as Pcm>::from_norm(0.0), 0);
        assert_eq!(<u8 as Pcm>::from_norm(1.0), 255);
        assert_eq!(<u8 as Pcm>::from_norm(-1.0), 0);
    }

    #[test]
    fn test_scale_raw_value() {
        assert_eq!(<i16 as Pcm>::scale(1000, 0.5), 500);
        assert_eq!(<u8 as Pcm>::scale(200, 0.5), 100);
    }
}
