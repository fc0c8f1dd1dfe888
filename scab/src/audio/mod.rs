//! Audio sources and device output
//!
//! Loading and synthesis of PCM stimuli, the source store, and the cpal
//! device session that hosts the mixing engine.

pub mod output;
pub mod store;
pub mod synth;
pub mod types;

pub use output::{list_output_devices, AudioSession, DeviceSession, SessionClock};
pub use store::AudioStore;
pub use types::{Pcm, PcmBuffer, SampleFormat};
