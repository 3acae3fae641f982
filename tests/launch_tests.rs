use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::Notify;

use ember::launch::{
    JobHandle, JobOutcome, JobState, LaunchError, LaunchEvent, LaunchPipeline, LaunchRequest,
    Launcher, ProgressBus, StagedPipeline,
};

fn request(server: &str, memory_mb: u32) -> LaunchRequest {
    LaunchRequest::builder().server(server).memory_mb(memory_mb).build()
}

fn quick_launcher() -> Launcher {
    Launcher::new(
        ProgressBus::new(),
        Arc::new(StagedPipeline {
            step_delay: Duration::from_millis(1),
        }),
    )
}

async fn collect_until_done(
    events: &mut ember::bus::Subscription<LaunchEvent>,
    job: uuid::Uuid,
) -> Vec<LaunchEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        if event.job() != job {
            continue;
        }
        let terminal = event.is_terminal();
        seen.push(event);
        if terminal {
            break;
        }
    }
    seen
}

#[tokio::test]
async fn staged_run_emits_exactly_one_terminal_done_last() {
    let launcher = quick_launcher();
    let mut events = launcher.bus().subscribe();
    let job = launcher.start(request("s1", 4096)).unwrap();

    let seen = collect_until_done(&mut events, job).await;

    let done_count = seen.iter().filter(|event| event.is_terminal()).count();
    assert_eq!(done_count, 1);
    assert!(seen.last().unwrap().is_terminal());
    match seen.last().unwrap() {
        LaunchEvent::Done { ok, error, .. } => {
            assert!(*ok);
            assert!(error.is_none());
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn staged_run_folds_to_one_hundred_percent() {
    let launcher = quick_launcher();
    let mut events = launcher.bus().subscribe();
    let job = launcher.start(request("s1", 4096)).unwrap();

    let mut state = JobState::new(job);
    let mut last_percent = 0;
    for event in collect_until_done(&mut events, job).await {
        state.apply(&event);
        // Progress never regresses while the job is active.
        assert!(state.percent >= last_percent);
        last_percent = state.percent;
    }

    assert_eq!(state.percent, 100);
    assert_eq!(state.outcome, Some(JobOutcome::Success));
    assert!(state.log.iter().any(|line| line.contains("server=s1")));
}

#[tokio::test]
async fn validation_failures_are_immediate() {
    let launcher = quick_launcher();

    assert_eq!(
        launcher.start(request("  ", 4096)).unwrap_err(),
        LaunchError::EmptyServer
    );
    assert_eq!(
        launcher.start(request("s1", 100)).unwrap_err(),
        LaunchError::MemoryOutOfRange(100)
    );
    assert_eq!(
        launcher.start(request("s1", 1 << 20)).unwrap_err(),
        LaunchError::MemoryOutOfRange(1 << 20)
    );
}

/// Pipeline that holds the job open until released.
struct GatedPipeline {
    release: Arc<Notify>,
}

#[async_trait]
impl LaunchPipeline for GatedPipeline {
    async fn run(&self, handle: JobHandle, _request: LaunchRequest) {
        self.release.notified().await;
        handle.finish(JobOutcome::Success);
    }
}

#[tokio::test]
async fn second_start_while_in_flight_is_rejected() {
    let release = Arc::new(Notify::new());
    let launcher = Launcher::new(
        ProgressBus::new(),
        Arc::new(GatedPipeline {
            release: release.clone(),
        }),
    );
    let mut events = launcher.bus().subscribe();

    let first = launcher.start(request("s1", 4096)).unwrap();
    assert_eq!(
        launcher.start(request("s2", 4096)).unwrap_err(),
        LaunchError::JobInFlight
    );

    release.notify_one();
    collect_until_done(&mut events, first).await;

    // After the terminal event a new logical job is accepted, with a
    // fresh id that old events can never be attributed to.
    let second = launcher.start(request("s2", 4096)).unwrap();
    assert_ne!(first, second);

    let mut state = JobState::new(second);
    state.apply(&LaunchEvent::Progress {
        job: first,
        stage: "stale".to_string(),
        percent: 80,
        detail: None,
    });
    assert_eq!(state.percent, 0);
}

/// Pipeline that fails with whatever error text it was built with.
struct FailingPipeline {
    error: &'static str,
}

#[async_trait]
impl LaunchPipeline for FailingPipeline {
    async fn run(&self, handle: JobHandle, _request: LaunchRequest) {
        handle.progress("verify", 10, None);
        handle.finish(JobOutcome::Failed {
            error: self.error.to_string(),
        });
    }
}

#[tokio::test]
async fn failed_done_always_carries_error_text() {
    let launcher = Launcher::new(
        ProgressBus::new(),
        Arc::new(FailingPipeline {
            error: "jvm exited with code 1",
        }),
    );
    let mut events = launcher.bus().subscribe();
    let job = launcher.start(request("s1", 4096)).unwrap();

    let seen = collect_until_done(&mut events, job).await;
    match seen.last().unwrap() {
        LaunchEvent::Done { ok, error, .. } => {
            assert!(!*ok);
            assert_eq!(error.as_deref(), Some("jvm exited with code 1"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn empty_failure_text_is_normalized() {
    let launcher = Launcher::new(ProgressBus::new(), Arc::new(FailingPipeline { error: "  " }));
    let mut events = launcher.bus().subscribe();
    let job = launcher.start(request("s1", 4096)).unwrap();

    let seen = collect_until_done(&mut events, job).await;
    match seen.last().unwrap() {
        LaunchEvent::Done { error, .. } => {
            assert_eq!(error.as_deref(), Some("unknown error"));
        }
        _ => unreachable!(),
    }
}

/// Pipeline that forgets to finish.
struct DroppingPipeline;

#[async_trait]
impl LaunchPipeline for DroppingPipeline {
    async fn run(&self, handle: JobHandle, _request: LaunchRequest) {
        handle.progress("verify", 10, None);
        // Handle dropped here without a terminal event.
    }
}

#[tokio::test]
async fn dropped_handle_still_produces_a_failed_done() {
    let launcher = Launcher::new(ProgressBus::new(), Arc::new(DroppingPipeline));
    let mut events = launcher.bus().subscribe();
    let job = launcher.start(request("s1", 4096)).unwrap();

    let seen = collect_until_done(&mut events, job).await;
    match seen.last().unwrap() {
        LaunchEvent::Done { ok, error, .. } => {
            assert!(!*ok);
            assert!(error.as_deref().unwrap().contains("without completing"));
        }
        _ => unreachable!(),
    }

    // The slot is free again.
    assert!(launcher.start(request("s1", 4096)).is_ok());
}

#[tokio::test]
async fn unsubscribed_listener_misses_the_job() {
    let launcher = quick_launcher();
    let mut early = launcher.bus().subscribe();
    let mut live = launcher.bus().subscribe();

    early.unsubscribe();
    let job = launcher.start(request("s1", 4096)).unwrap();

    collect_until_done(&mut live, job).await;
    assert!(early.try_recv().is_none());
}
