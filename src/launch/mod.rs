//! Launch jobs and their progress event stream.

pub mod events;
pub mod launcher;
pub mod state;

pub use events::{JobOutcome, LaunchEvent};
pub use launcher::{
    prepare_command, JobHandle, LaunchError, LaunchPipeline, LaunchRequest, Launcher,
    StagedPipeline, MAX_MEMORY_MB, MIN_MEMORY_MB,
};
pub use state::JobState;

/// Per-process fan-out for launch events.
pub type ProgressBus = crate::bus::EventBus<LaunchEvent>;
