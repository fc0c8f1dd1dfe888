//! Stimulation plan
//!
//! A plan is an ordered list of timed stimulus events. Order is
//! significant: entries that become due in the same scheduler tick fire in
//! plan order, not chronological order, and the plan is never re-sorted.

use crate::audio::types::Pcm;
use crate::audio::store::AudioStore;
use crate::error::{Error, Result};

/// One planned stimulus presentation
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    /// Trigger time in seconds, relative to session start
    pub onset: f64,

    /// Source id in the audio store
    pub source_id: u32,

    /// Target output channels, 1-based
    pub channels: Vec<u16>,

    /// Marker value emitted at dispatch
    pub marker: u8,
}

/// Session termination mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Termination {
    /// Run until cancelled externally
    NoLimit,

    /// Stop once every planned stimulus has finished playing:
    /// max over the plan of onset + source duration
    Auto,

    /// Stop after an explicit horizon in seconds
    At(f64),
}

/// Validate a plan against the store before playback starts.
///
/// Fails fast on a missing source, an empty channel list, or a negative
/// onset, so no partial session can begin.
pub fn validate<T: Pcm>(plan: &[ScheduledEvent], store: &AudioStore<T>) -> Result<()> {
    for (i, event) in plan.iter().enumerate() {
        if !store.contains(event.source_id) {
            return Err(Error::Data(format!(
                "plan entry {}: source id {} does not exist",
                i, event.source_id
            )));
        }
        if event.channels.is_empty() {
            return Err(Error::Data(format!("plan entry {}: no target channels", i)));
        }
        if event.onset < 0.0 || !event.onset.is_finite() {
            return Err(Error::Data(format!(
                "plan entry {}: onset {} is not a non-negative time",
                i, event.onset
            )));
        }
    }
    Ok(())
}

/// Resolve a termination mode to an optional horizon in seconds.
///
/// # Errors
/// - Auto termination over an empty plan has no maximum and fails fast
/// - An explicit horizon must be a non-negative finite time
pub fn resolve_horizon<T: Pcm>(
    termination: Termination,
    plan: &[ScheduledEvent],
    store: &AudioStore<T>,
) -> Result<Option<f64>> {
    match termination {
        Termination::NoLimit => Ok(None),
        Termination::At(secs) => {
            if secs < 0.0 || !secs.is_finite() {
                return Err(Error::Config(format!(
                    "termination horizon {} is not a non-negative time",
                    secs
                )));
            }
            Ok(Some(secs))
        }
        Termination::Auto => {
            if plan.is_empty() {
                return Err(Error::Data(
                    "auto termination is undefined for an empty plan".into(),
                ));
            }
            let mut horizon = 0.0f64;
            for event in plan {
                let end = event.onset + store.duration_of(event.source_id)?;
                horizon = horizon.max(end);
            }
            Ok(Some(horizon))
        }
    }
}
