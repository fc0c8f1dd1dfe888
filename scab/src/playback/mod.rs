//! Playback engine and stimulus scheduling
//!
//! The mixer and its playback slots run inside the audio callback; the
//! scheduler dispatches the plan from the control loop; the run state is
//! the shared seam between them and the outside world.

pub mod mixer;
pub mod plan;
pub mod scheduler;
pub mod slot;
pub mod state;

pub use mixer::Mixer;
pub use plan::{ScheduledEvent, Termination};
pub use scheduler::Scheduler;
pub use slot::PlaybackSlot;
pub use state::{Phase, RunState};
