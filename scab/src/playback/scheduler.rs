//! Stimulus scheduler
//!
//! Polling control loop that dispatches a stimulation plan against the
//! session's hardware clock. Each tick it scans the pending plan in order,
//! triggers playback and marker emission for every entry whose onset has
//! elapsed, and removes dispatched entries. Dispatch latency, and with it
//! stimulus-onset jitter, is bounded by one tick interval.
//!
//! One `play` call walks the run state through Idle -> Running -> Finished.
//! An external controller can end the loop early by writing any
//! non-Running phase; the cancellation is observed at the next tick.

use crate::audio::output::AudioSession;
use crate::audio::store::AudioStore;
use crate::audio::types::Pcm;
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::playback::plan::{self, ScheduledEvent, Termination};
use crate::playback::state::{Phase, RunState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Plan-dispatching control loop
pub struct Scheduler {
    /// Poll interval; smaller ticks reduce dispatch jitter at the cost of
    /// control-thread CPU
    tick: Duration,

    /// Pause after the loop exits, letting in-flight audio drain before
    /// the stream closes
    settle: Duration,

    /// How long to wait for the first callback's clock reading
    clock_timeout: Duration,

    state: Arc<RunState>,
}

impl Scheduler {
    pub fn new(cfg: &SchedulerConfig, state: Arc<RunState>) -> Self {
        Self {
            tick: cfg.tick(),
            settle: cfg.settle(),
            clock_timeout: cfg.clock_timeout(),
            state,
        }
    }

    /// Shared control block for observers and external cancellation
    pub fn state(&self) -> Arc<RunState> {
        Arc::clone(&self.state)
    }

    /// Run one stimulation session.
    ///
    /// Validates the plan and resolves the termination horizon before any
    /// audio starts, opens the session, waits for the hardware clock, then
    /// polls until the horizon is exceeded or the run state leaves
    /// Running. Markers are passed to `marker_sink` synchronously at
    /// dispatch time, always after the matching playback trigger.
    ///
    /// The plan is consumed: each entry is dispatched at most once, and
    /// entries due in the same tick fire in plan order.
    pub async fn play<T, S, M>(
        &self,
        session: &mut S,
        store: &AudioStore<T>,
        mut plan: Vec<ScheduledEvent>,
        termination: Termination,
        marker_sink: &mut M,
    ) -> Result<()>
    where
        T: Pcm,
        S: AudioSession<T>,
        M: FnMut(u8),
    {
        // Fail fast, before the device opens
        plan::validate(&plan, store)?;
        let horizon = plan::resolve_horizon(termination, &plan, store)?;

        self.state.reset();
        self.state.set_phase(Phase::Running);
        info!(
            "Starting session: {} plan entries, horizon {}",
            plan.len(),
            match horizon {
                Some(h) => format!("{:.3}s", h),
                None => "none".into(),
            }
        );

        session.open()?;

        let start = match self.wait_for_clock(session).await {
            Ok(start) => start,
            Err(e) => {
                self.state.set_phase(Phase::Finished);
                session.close();
                return Err(e);
            }
        };
        debug!("Session clock available, start = {:?}", start);

        let result = loop {
            if !self.state.is_running() {
                info!("Session cancelled externally");
                break Ok(());
            }
            if session.faulted() {
                break Err(Error::Device("audio stream fault".into()));
            }

            let now = session.now().unwrap_or(start);
            let elapsed = now.saturating_sub(start).as_secs_f64();

            if let Err(e) = self.dispatch_due(&mut plan, elapsed, session, store, marker_sink) {
                break Err(e);
            }

            if let Some(horizon) = horizon {
                if elapsed > horizon {
                    debug!("Termination horizon reached at {:.3}s", elapsed);
                    break Ok(());
                }
            }

            tokio::time::sleep(self.tick).await;
        };

        self.state.set_phase(Phase::Finished);

        match result {
            Ok(()) => {
                if !self.settle.is_zero() {
                    tokio::time::sleep(self.settle).await;
                }
                session.close();
                if !plan.is_empty() {
                    info!("Session finished, {} plan entries undispatched", plan.len());
                } else {
                    info!("Session finished");
                }
                Ok(())
            }
            Err(e) => {
                warn!("Session aborted: {}", e);
                session.close();
                Err(e)
            }
        }
    }

    /// Poll until the first callback publishes a clock reading.
    ///
    /// The transient is expected right after open and is not an error
    /// unless the stream stays silent past the timeout.
    async fn wait_for_clock<T, S>(&self, session: &mut S) -> Result<Duration>
    where
        T: Pcm,
        S: AudioSession<T>,
    {
        let waiting_since = Instant::now();
        loop {
            if let Some(reading) = session.now() {
                return Ok(reading);
            }
            if session.faulted() {
                return Err(Error::Device("audio stream fault before first callback".into()));
            }
            if waiting_since.elapsed() > self.clock_timeout {
                return Err(Error::Device(format!(
                    "hardware clock not available within {:?}",
                    self.clock_timeout
                )));
            }
            tokio::time::sleep(self.tick).await;
        }
    }

    /// Dispatch every pending entry whose onset has elapsed, in plan order.
    ///
    /// Entries are removed as they fire; removal never skips or repeats a
    /// neighbor when several entries become due in the same scan.
    fn dispatch_due<T, S, M>(
        &self,
        plan: &mut Vec<ScheduledEvent>,
        elapsed: f64,
        session: &mut S,
        store: &AudioStore<T>,
        marker_sink: &mut M,
    ) -> Result<()>
    where
        T: Pcm,
        S: AudioSession<T>,
        M: FnMut(u8),
    {
        let mut i = 0;
        while i < plan.len() {
            if elapsed >= plan[i].onset {
                let event = plan.remove(i);
                let source = store.get(event.source_id)?;
                // Playback first, then the paired marker
                session.play(source, &event.channels)?;
                (marker_sink)(event.marker);
                self.state.record_marker(event.marker);
                debug!(
                    "Dispatched source {} (marker {}) at {:.4}s, planned {:.4}s",
                    event.source_id, event.marker, elapsed, event.onset
                );
            } else {
                i += 1;
            }
        }
        Ok(())
    }
}
