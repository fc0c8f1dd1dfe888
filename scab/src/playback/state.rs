//! Shared run state
//!
//! Small lock-free control block linking the scheduler to outside
//! observers and controllers. The scheduler writes the phase and the last
//! emitted marker; an external controller can request cooperative
//! cancellation by writing any non-Running phase. The scheduler checks the
//! phase once per tick, so cancellation takes effect within one tick
//! interval.
//!
//! Visibility contract: all fields are atomics written with Release and
//! read with Acquire; a reader polling the block sees a marker no later
//! than the phase write that followed it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Scheduler lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// No session in progress
    Idle = 0,
    /// Control loop is dispatching
    Running = 1,
    /// Session ended (horizon reached, cancelled, or failed)
    Finished = 2,
}

impl Phase {
    fn from_u8(v: u8) -> Phase {
        match v {
            1 => Phase::Running,
            2 => Phase::Finished,
            _ => Phase::Idle,
        }
    }
}

/// Shared control block for one scheduler.
///
/// Clone the `Arc` and hand it to whatever needs to observe markers or
/// request cancellation.
#[derive(Debug)]
pub struct RunState {
    phase: AtomicU8,
    last_marker: AtomicU8,
}

impl RunState {
    /// New control block in the Idle phase
    pub fn new() -> Arc<RunState> {
        Arc::new(RunState {
            phase: AtomicU8::new(Phase::Idle as u8),
            last_marker: AtomicU8::new(0),
        })
    }

    /// Back to Idle with no marker; the scheduler resets the block at the
    /// start of each session
    pub fn reset(&self) {
        self.set_phase(Phase::Idle);
        self.last_marker.store(0, Ordering::Release);
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Set the phase
    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// True while the scheduler should keep dispatching
    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Request cooperative cancellation.
    ///
    /// Takes effect at the scheduler's next tick; audio already mixed is
    /// not rolled back.
    pub fn request_stop(&self) {
        self.set_phase(Phase::Finished);
    }

    /// Record the marker value of the most recent dispatch
    pub fn record_marker(&self, marker: u8) {
        self.last_marker.store(marker, Ordering::Release);
    }

    /// Marker value of the most recent dispatch (0 before any)
    pub fn last_marker(&self) -> u8 {
        self.last_marker.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let state = RunState::new();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(!state.is_running());
        assert_eq!(state.last_marker(), 0);
    }

    #[test]
    fn test_phase_round_trip() {
        let state = RunState::new();
        state.set_phase(Phase::Running);
        assert!(state.is_running());
        state.set_phase(Phase::Finished);
        assert_eq!(state.phase(), Phase::Finished);
        assert!(!state.is_running());
    }

    #[test]
    fn test_request_stop_leaves_running() {
        let state = RunState::new();
        state.set_phase(Phase::Running);
        state.request_stop();
        assert!(!state.is_running());
    }

    #[test]
    fn test_marker_recorded() {
        let state = RunState::new();
        state.record_marker(42);
        assert_eq!(state.last_marker(), 42);
    }

    #[test]
    fn test_reset_clears_phase_and_marker() {
        let state = RunState::new();
        state.set_phase(Phase::Finished);
        state.record_marker(9);
        state.reset();
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.last_marker(), 0);
    }
}
