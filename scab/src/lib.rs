//! # scab — Stimulation Controller for Auditory BCI
//!
//! Presents precisely-timed multi-channel auditory stimuli and emits
//! synchronized event markers for auditory brain-computer-interface
//! experiments.
//!
//! **Purpose:** Load or synthesize PCM stimuli, stream them in fixed-size
//! chunks through a hardware audio callback with additive channel mixing,
//! and dispatch a timed stimulation plan against the live hardware clock,
//! pairing every stimulus onset with an out-of-band marker.
//!
//! **Architecture:** cpal output callback owns the mixing engine; a tokio
//! control loop polls the session clock and dispatches plan entries.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
