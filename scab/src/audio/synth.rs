//! Synthetic waveform generation
//!
//! Builds sine-tone PCM buffers for stimuli that are generated rather than
//! loaded from disk. The optional linear rise/fall window is applied in the
//! normalized float domain before quantization, so a windowed uint8 tone
//! decays toward the format midpoint rather than toward zero.

use crate::audio::types::{Pcm, PcmBuffer};
use crate::error::{Error, Result};

/// Generate a sine tone.
///
/// # Arguments
/// - `channels`: output channel count (the same waveform on every channel)
/// - `frequency`: tone frequency in Hz
/// - `duration_secs`: tone length in seconds
/// - `gain`: linear amplitude in [0.0, 1.0]
/// - `frame_rate`: session frame rate in Hz
/// - `rise_fall_secs`: optional linear window ramp length at each end
///
/// # Errors
/// Returns a data error for a zero channel count, a non-positive duration,
/// or a window that does not fit the tone.
pub fn tone<T: Pcm>(
    channels: u16,
    frequency: f64,
    duration_secs: f64,
    gain: f32,
    frame_rate: u32,
    rise_fall_secs: Option<f64>,
) -> Result<PcmBuffer<T>> {
    if channels == 0 {
        return Err(Error::Data("tone needs at least one channel".into()));
    }
    if duration_secs <= 0.0 {
        return Err(Error::Data(format!(
            "tone duration must be positive, got {}",
            duration_secs
        )));
    }

    let frames = (duration_secs * frame_rate as f64).round() as usize;
    let ramp = match rise_fall_secs {
        Some(secs) => (secs * frame_rate as f64) as usize,
        None => 0,
    };
    if ramp > 0 && frames < 2 * ramp {
        return Err(Error::Data(format!(
            "window of 2x{} frames does not fit a {}-frame tone",
            ramp, frames
        )));
    }

    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f64 / frame_rate as f64;
        let mut x = gain as f64 * (2.0 * std::f64::consts::PI * frequency * t).sin();
        x *= window_weight(i, frames, ramp);
        let sample = T::from_norm(x as f32);
        for _ in 0..channels {
            samples.push(sample);
        }
    }

    PcmBuffer::from_samples(samples, channels)
}

/// Linear rise/fall weight for frame `i` of `frames`, ramp length `ramp`
fn window_weight(i: usize, frames: usize, ramp: usize) -> f64 {
    if ramp == 0 {
        return 1.0;
    }
    if i < ramp {
        if ramp > 1 {
            i as f64 / (ramp - 1) as f64
        } else {
            1.0
        }
    } else if i >= frames - ramp {
        let step = i - (frames - ramp);
        (ramp - step) as f64 / ramp as f64
    } else {
        1.0
    }
}
