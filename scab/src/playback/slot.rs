//! Playback slot: chunked reader over one audio source
//!
//! A slot streams one source buffer toward a set of 1-based output
//! channels, one fixed-size chunk per audio callback. The read path is
//! allocation-free: the chunk buffer is reused across calls and the
//! channel-duplication policy is resolved to an index map at construction.

use crate::audio::types::{Pcm, PcmBuffer};
use std::sync::Arc;

/// Streaming reader for one playback invocation of one source.
///
/// Created on the control thread, then owned exclusively by the audio
/// callback thread; nothing else touches the cursor once playback starts.
pub struct PlaybackSlot<T> {
    source: Arc<PcmBuffer<T>>,

    /// Target output channels, 1-based
    targets: Vec<u16>,

    /// Source channel feeding each target, after duplication expansion.
    ///
    /// A source with fewer channels than requested targets has its channel
    /// block conceptually doubled until it covers them, so target index `j`
    /// reads source channel `j % source.channels`. Content duplication, not
    /// down-mixing.
    source_channel: Vec<u16>,

    /// Read position in whole chunks
    cursor: usize,

    /// Frames per chunk, equal to the hardware buffer size
    chunk_size: usize,

    /// Reusable chunk output buffer, frame-major: chunk_size x targets
    chunk: Vec<T>,

    finished: bool,
}

impl<T: Pcm> PlaybackSlot<T> {
    /// Create a slot streaming `source` toward `targets`.
    ///
    /// `targets` must be non-empty 1-based channel numbers; the caller
    /// (mixing engine) validates them against the device channel count.
    pub fn new(source: Arc<PcmBuffer<T>>, chunk_size: usize, targets: Vec<u16>) -> Self {
        let source_channel = targets
            .iter()
            .enumerate()
            .map(|(j, _)| (j % source.channels as usize) as u16)
            .collect();
        let chunk = vec![T::SILENCE; chunk_size * targets.len()];

        Self {
            source,
            targets,
            source_channel,
            cursor: 0,
            chunk_size,
            chunk,
            finished: false,
        }
    }

    /// Target output channels, 1-based
    pub fn targets(&self) -> &[u16] {
        &self.targets
    }

    /// True once the final (zero-padded) chunk has been read
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Contents of the most recent `read_chunk` call
    pub fn chunk(&self) -> &[T] {
        &self.chunk
    }

    /// Read the next chunk.
    ///
    /// Always returns exactly `chunk_size` frames for the configured
    /// targets, frame-major. When fewer source frames remain, the valid
    /// prefix is copied and the rest zero-filled, and the slot reports
    /// finished from this call on. The cursor advances by one chunk per
    /// call regardless of how many frames were valid.
    pub fn read_chunk(&mut self) -> &[T] {
        let start = self.cursor * self.chunk_size;
        let remaining = self.source.frames.saturating_sub(start);
        let valid = remaining.min(self.chunk_size);
        let n_targets = self.targets.len();

        for frame in 0..valid {
            for (j, &sc) in self.source_channel.iter().enumerate() {
                self.chunk[frame * n_targets + j] = self.source.sample(start + frame, sc);
            }
        }
        if valid < self.chunk_size {
            self.chunk[valid * n_targets..].fill(T::SILENCE);
            self.finished = true;
        }

        self.cursor += 1;
        &self.chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(samples: Vec<i16>, channels: u16) -> Arc<PcmBuffer<i16>> {
        Arc::new(PcmBuffer::from_samples(samples, channels).unwrap())
    }

    #[test]
    fn test_full_chunks_then_padded_tail() {
        // 5 mono frames, chunk of 4
        let slot_source = source(vec![1, 2, 3, 4, 5], 1);
        let mut slot = PlaybackSlot::new(slot_source, 4, vec![1]);

        assert_eq!(slot.read_chunk(), &[1, 2, 3, 4]);
        assert!(!slot.is_finished());

        // Tail: valid prefix matches the source tail, rest is zero
        assert_eq!(slot.read_chunk(), &[5, 0, 0, 0]);
        assert!(slot.is_finished());
    }

    #[test]
    fn test_finished_stays_true_and_chunks_stay_zero() {
        let slot_source = source(vec![1, 2], 1);
        let mut slot = PlaybackSlot::new(slot_source, 2, vec![1]);

        assert_eq!(slot.read_chunk(), &[1, 2]);
        assert!(!slot.is_finished());
        assert_eq!(slot.read_chunk(), &[0, 0]);
        assert!(slot.is_finished());
        assert_eq!(slot.read_chunk(), &[0, 0]);
        assert!(slot.is_finished());
    }

    #[test]
    fn test_exact_multiple_finishes_on_all_zero_chunk() {
        // Source length an exact multiple of the chunk: the finish flag is
        // raised by the following all-zero read.
        let slot_source = source(vec![1, 2, 3, 4], 1);
        let mut slot = PlaybackSlot::new(slot_source, 2, vec![1]);

        assert_eq!(slot.read_chunk(), &[1, 2]);
        assert_eq!(slot.read_chunk(), &[3, 4]);
        assert!(!slot.is_finished());
        assert_eq!(slot.read_chunk(), &[0, 0]);
        assert!(slot.is_finished());
    }

    #[test]
    fn test_mono_duplicated_to_two_targets() {
        let slot_source = source(vec![10, 20, 30], 1);
        let mut slot = PlaybackSlot::new(slot_source, 3, vec![1, 2]);

        // Both targets carry bit-identical copies of the mono source
        assert_eq!(slot.read_chunk(), &[10, 10, 20, 20, 30, 30]);
    }

    #[test]
    fn test_stereo_duplicated_to_three_targets() {
        let slot_source = source(vec![1, 2, 3, 4], 2);
        let mut slot = PlaybackSlot::new(slot_source, 2, vec![1, 2, 3]);

        // Third target wraps back to source channel 0
        assert_eq!(slot.read_chunk(), &[1, 2, 1, 3, 4, 3]);
    }

    #[test]
    fn test_stereo_source_on_stereo_targets_unchanged() {
        let slot_source = source(vec![1, 2, 3, 4], 2);
        let mut slot = PlaybackSlot::new(slot_source, 2, vec![1, 2]);
        assert_eq!(slot.read_chunk(), &[1, 2, 3, 4]);
    }
}
