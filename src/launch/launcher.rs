//! Fire-and-forget launch jobs.
//!
//! [`Launcher::start`] validates the request, fails fast on immediate
//! problems only, and spawns the pipeline; everything after that arrives
//! as events on the progress bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::events::{JobOutcome, LaunchEvent};
use super::ProgressBus;

pub const MIN_MEMORY_MB: u32 = 512;
pub const MAX_MEMORY_MB: u32 = 32_768;

/// What to launch and with how much memory.
#[derive(Debug, Clone, Builder)]
pub struct LaunchRequest {
    #[builder(into)]
    pub server: String,
    pub memory_mb: u32,
}

/// Immediate launch failures. Anything after `start` returns is reported
/// through the event stream instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("no server selected")]
    EmptyServer,
    #[error("memory budget {0} MB out of range (512–32768)")]
    MemoryOutOfRange(u32),
    #[error("a launch job is already in flight")]
    JobInFlight,
}

/// Emitter handed to the pipeline for one job.
///
/// Exactly one terminal event per job is guaranteed by construction:
/// [`JobHandle::finish`] consumes the handle, and dropping it unfinished
/// emits a failed terminal event instead of losing the job.
pub struct JobHandle {
    job: Uuid,
    bus: ProgressBus,
    guard: InFlightGuard,
    finished: bool,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.job
    }

    pub fn progress(&self, stage: &str, percent: u8, detail: Option<&str>) {
        self.bus.publish(LaunchEvent::Progress {
            job: self.job,
            stage: stage.to_string(),
            percent: percent.min(100),
            detail: detail.map(|text| text.to_string()),
        });
    }

    pub fn log(&self, line: &str) {
        self.bus.publish(LaunchEvent::Log {
            job: self.job,
            line: line.to_string(),
        });
    }

    /// Emit the terminal event. A failed outcome always carries non-empty
    /// error text.
    pub fn finish(mut self, outcome: JobOutcome) {
        let (ok, error) = match outcome {
            JobOutcome::Success => (true, None),
            JobOutcome::Failed { error } => {
                let error = if error.trim().is_empty() {
                    "unknown error".to_string()
                } else {
                    error
                };
                (false, Some(error))
            }
        };
        self.finished = true;
        // Release before publishing, so a consumer reacting to `done` can
        // start the next job without hitting JobInFlight.
        self.guard.release();
        self.bus.publish(LaunchEvent::Done {
            job: self.job,
            ok,
            error,
        });
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(job = %self.job, "pipeline dropped its handle before finishing");
            self.guard.release();
            self.bus.publish(LaunchEvent::Done {
                job: self.job,
                ok: false,
                error: Some("launch pipeline ended without completing".to_string()),
            });
        }
    }
}

struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn release(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// The actual launch work, driven entirely through the [`JobHandle`].
#[async_trait]
pub trait LaunchPipeline: Send + Sync {
    async fn run(&self, handle: JobHandle, request: LaunchRequest);
}

/// Starts launch jobs and owns the single-job-in-flight policy.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use ember::launch::{Launcher, LaunchRequest, ProgressBus, StagedPipeline};
///
/// # async fn example() -> Result<(), ember::launch::LaunchError> {
/// let launcher = Launcher::new(ProgressBus::new(), Arc::new(StagedPipeline::default()));
/// let mut events = launcher.bus().subscribe();
/// launcher.start(LaunchRequest::builder().server("s1").memory_mb(4096).build())?;
/// while let Some(event) = events.recv().await {
///     if event.is_terminal() {
///         break;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Launcher {
    bus: ProgressBus,
    pipeline: Arc<dyn LaunchPipeline>,
    in_flight: Arc<AtomicBool>,
}

impl Launcher {
    pub fn new(bus: ProgressBus, pipeline: Arc<dyn LaunchPipeline>) -> Self {
        Self {
            bus,
            pipeline,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    /// Start a new logical job. Fire-and-forget: the returned id only
    /// correlates events, it says nothing about the outcome.
    pub fn start(&self, request: LaunchRequest) -> Result<Uuid, LaunchError> {
        if request.server.trim().is_empty() {
            return Err(LaunchError::EmptyServer);
        }
        if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&request.memory_mb) {
            return Err(LaunchError::MemoryOutOfRange(request.memory_mb));
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LaunchError::JobInFlight);
        }

        let job = Uuid::new_v4();
        let handle = JobHandle {
            job,
            bus: self.bus.clone(),
            guard: InFlightGuard {
                flag: self.in_flight.clone(),
            },
            finished: false,
        };
        debug!(%job, server = %request.server, memory_mb = request.memory_mb, "launch job started");

        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            pipeline.run(handle, request).await;
        });
        Ok(job)
    }
}

/// Render the game client command line for a request.
pub fn prepare_command(request: &LaunchRequest) -> String {
    format!(
        "java -Xmx{}m -XX:+UseG1GC -jar ./game/{}/client.jar --server {}",
        request.memory_mb, request.server, request.server
    )
}

/// Default pipeline walking the launch stages with simulated work.
///
/// TODO: replace the simulated downloads with the real asset resolver once
/// the backend exposes its manifest API.
pub struct StagedPipeline {
    pub step_delay: Duration,
}

impl Default for StagedPipeline {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(350),
        }
    }
}

#[async_trait]
impl LaunchPipeline for StagedPipeline {
    async fn run(&self, handle: JobHandle, request: LaunchRequest) {
        handle.log(&format!(
            "preparing launch: server={}, memory={} MB",
            request.server, request.memory_mb
        ));

        handle.progress("verify", 5, Some("reading config"));
        tokio::time::sleep(self.step_delay).await;

        handle.progress("resolve", 15, Some("manifests"));
        tokio::time::sleep(self.step_delay).await;

        for percent in [20, 30, 45, 60, 75, 85] {
            handle.progress("download", percent, Some("libraries/assets"));
            tokio::time::sleep(self.step_delay).await;
        }

        handle.progress("verify", 90, Some("integrity"));
        tokio::time::sleep(self.step_delay).await;

        handle.log("starting jvm");
        handle.progress("launch", 98, Some(&prepare_command(&request)));
        tokio::time::sleep(self.step_delay).await;

        handle.progress("ready", 100, None);
        handle.finish(JobOutcome::Success);
    }
}
