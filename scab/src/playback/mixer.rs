//! Mixing engine
//!
//! Owns the live set of playback slots and is driven by the audio callback
//! on its fixed cadence. Each invocation zeroes the output buffer, then
//! adds every unfinished slot's next chunk into the columns for that
//! slot's target channels. Overlapping stimuli sum sample-wise in the
//! native integer type; overflow wraps.
//!
//! Slots are appended by the control thread and only ever read and flagged
//! by the callback; finished slots are retained for the rest of the
//! session so the callback never mutates the collection shape mid-stream.

use crate::audio::types::{Pcm, PcmBuffer};
use crate::error::{Error, Result};
use crate::playback::slot::PlaybackSlot;
use std::sync::Arc;

/// Additive mixer for the hardware output callback
pub struct Mixer<T> {
    /// Active playback slots, append-only for the session
    slots: Vec<PlaybackSlot<T>>,

    /// Finished flag per slot, parallel to `slots`; gates all callback work
    finished: Vec<bool>,

    /// Device output channel count
    channels: u16,

    /// Frames per hardware buffer
    chunk_size: usize,
}

impl<T: Pcm> Mixer<T> {
    /// Create an idle mixer for a device with `channels` outputs
    pub fn new(channels: u16, chunk_size: usize) -> Self {
        Self {
            slots: Vec::new(),
            finished: Vec::new(),
            channels,
            chunk_size,
        }
    }

    /// Drop all slots; called when a session opens
    pub fn reset(&mut self) {
        self.slots.clear();
        self.finished.clear();
    }

    /// Device output channel count
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Frames per hardware buffer
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of slots still producing audio
    pub fn active_slots(&self) -> usize {
        self.finished.iter().filter(|f| !**f).count()
    }

    /// Start playing `source` on the given 1-based target channels.
    ///
    /// Appends a new slot; existing slots are never touched, so this is
    /// safe to interleave with callback invocations under the session
    /// lock.
    ///
    /// # Errors
    /// Returns a playback error when `targets` is empty or names a channel
    /// outside 1..=device channel count.
    pub fn play(&mut self, source: Arc<PcmBuffer<T>>, targets: &[u16]) -> Result<()> {
        if targets.is_empty() {
            return Err(Error::Playback("no target channels given".into()));
        }
        for &ch in targets {
            if ch == 0 || ch > self.channels {
                return Err(Error::Playback(format!(
                    "target channel {} outside device range 1..={}",
                    ch, self.channels
                )));
            }
        }

        self.slots
            .push(PlaybackSlot::new(source, self.chunk_size, targets.to_vec()));
        self.finished.push(false);
        Ok(())
    }

    /// Fill one hardware buffer.
    ///
    /// `out` is interleaved device-channel data of one callback period.
    /// Runs on the real-time thread: no allocation, no I/O, bounded work
    /// per slot.
    pub fn mix_into(&mut self, out: &mut [T]) {
        out.fill(T::SILENCE);
        let channels = self.channels as usize;
        if channels == 0 {
            return;
        }
        let frames = (out.len() / channels).min(self.chunk_size);

        for (slot, finished) in self.slots.iter_mut().zip(self.finished.iter_mut()) {
            if *finished {
                continue;
            }

            let _ = slot.read_chunk();
            let chunk = slot.chunk();
            let n_targets = slot.targets().len();
            for frame in 0..frames {
                for (j, &target) in slot.targets().iter().enumerate() {
                    let col = target as usize - 1;
                    let sample = chunk[frame * n_targets + j];
                    let cell = &mut out[frame * channels + col];
                    *cell = cell.mix(sample);
                }
            }

            if slot.is_finished() {
                *finished = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(samples: Vec<i16>, channels: u16) -> Arc<PcmBuffer<i16>> {
        Arc::new(PcmBuffer::from_samples(samples, channels).unwrap())
    }

    #[test]
    fn test_silence_when_idle() {
        let mut mixer = Mixer::<i16>::new(2, 4);
        let mut out = vec![99i16; 8];
        mixer.mix_into(&mut out);
        assert_eq!(out, vec![0i16; 8]);
    }

    #[test]
    fn test_single_slot_routed_to_target_column() {
        let mut mixer = Mixer::<i16>::new(2, 2);
        mixer.play(buffer(vec![10, 20], 1), &[2]).unwrap();

        let mut out = vec![0i16; 4];
        mixer.mix_into(&mut out);
        // Channel 1 silent, channel 2 carries the source
        assert_eq!(out, vec![0, 10, 0, 20]);
    }

    #[test]
    fn test_additive_mixing_is_linear() {
        let a = vec![100i16, 200, 300, 400];
        let b = vec![7i16, -7, 7, -7];
        let chunk = 4;

        let mix_alone = |samples: &[i16]| {
            let mut mixer = Mixer::<i16>::new(1, chunk);
            mixer.play(buffer(samples.to_vec(), 1), &[1]).unwrap();
            let mut out = vec![0i16; chunk];
            mixer.mix_into(&mut out);
            out
        };

        let out_a = mix_alone(&a);
        let out_b = mix_alone(&b);

        let mut mixer = Mixer::<i16>::new(1, chunk);
        mixer.play(buffer(a, 1), &[1]).unwrap();
        mixer.play(buffer(b, 1), &[1]).unwrap();
        let mut out_ab = vec![0i16; chunk];
        mixer.mix_into(&mut out_ab);

        for i in 0..chunk {
            assert_eq!(out_ab[i], out_a[i] + out_b[i]);
        }
    }

    #[test]
    fn test_finished_slot_retained_but_inert() {
        let mut mixer = Mixer::<i16>::new(1, 2);
        mixer.play(buffer(vec![5, 6], 1), &[1]).unwrap();
        assert_eq!(mixer.active_slots(), 1);

        let mut out = vec![0i16; 2];
        mixer.mix_into(&mut out);
        assert_eq!(out, vec![5, 6]);
        // Source length is an exact chunk multiple: the padding read flags it
        mixer.mix_into(&mut out);
        assert_eq!(out, vec![0, 0]);
        assert_eq!(mixer.active_slots(), 0);

        // Slot stays in the list, output stays silent
        mixer.mix_into(&mut out);
        assert_eq!(out, vec![0, 0]);
    }

    #[test]
    fn test_final_padded_chunk_still_mixed() {
        let mut mixer = Mixer::<i16>::new(1, 4);
        mixer.play(buffer(vec![1, 2, 3, 4, 5], 1), &[1]).unwrap();

        let mut out = vec![0i16; 4];
        mixer.mix_into(&mut out);
        assert_eq!(out, vec![1, 2, 3, 4]);
        // The read that raises the finished flag is still played out
        mixer.mix_into(&mut out);
        assert_eq!(out, vec![5, 0, 0, 0]);
        assert_eq!(mixer.active_slots(), 0);
    }

    #[test]
    fn test_overlap_on_shared_and_distinct_channels() {
        let mut mixer = Mixer::<i16>::new(2, 2);
        mixer.play(buffer(vec![10, 20], 1), &[1, 2]).unwrap();
        mixer.play(buffer(vec![1, 2], 1), &[2]).unwrap();

        let mut out = vec![0i16; 4];
        mixer.mix_into(&mut out);
        assert_eq!(out, vec![10, 11, 20, 22]);
    }

    #[test]
    fn test_overflow_wraps() {
        let mut mixer = Mixer::<i16>::new(1, 1);
        mixer.play(buffer(vec![i16::MAX], 1), &[1]).unwrap();
        mixer.play(buffer(vec![1], 1), &[1]).unwrap();

        let mut out = vec![0i16; 1];
        mixer.mix_into(&mut out);
        assert_eq!(out, vec![i16::MIN]);
    }

    #[test]
    fn test_invalid_targets_rejected() {
        let mut mixer = Mixer::<i16>::new(2, 4);
        let source = buffer(vec![0; 4], 1);
        assert!(mixer.play(source.clone(), &[]).is_err());
        assert!(mixer.play(source.clone(), &[0]).is_err());
        assert!(mixer.play(source.clone(), &[3]).is_err());
        assert!(mixer.play(source, &[1, 2]).is_ok());
    }

    #[test]
    fn test_reset_clears_slots() {
        let mut mixer = Mixer::<i16>::new(1, 2);
        mixer.play(buffer(vec![1, 2], 1), &[1]).unwrap();
        mixer.reset();
        assert_eq!(mixer.active_slots(), 0);
        let mut out = vec![9i16; 2];
        mixer.mix_into(&mut out);
        assert_eq!(out, vec![0, 0]);
    }
}
