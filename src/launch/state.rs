//! Consumer-side fold of the launch event stream.

use uuid::Uuid;

use super::events::{JobOutcome, LaunchEvent};

/// Accumulated view of one launch job.
///
/// Percent is clamped to 0..=100 and never decreases while the job is
/// active; a successful terminal event forces it to 100. Events tagged
/// with a different job id, or arriving after the terminal event, are
/// ignored.
#[derive(Debug, Clone)]
pub struct JobState {
    pub job: Uuid,
    pub stage: String,
    pub percent: u8,
    pub detail: Option<String>,
    pub log: Vec<String>,
    pub outcome: Option<JobOutcome>,
}

impl JobState {
    pub fn new(job: Uuid) -> Self {
        Self {
            job,
            stage: String::new(),
            percent: 0,
            detail: None,
            log: Vec::new(),
            outcome: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn apply(&mut self, event: &LaunchEvent) {
        if event.job() != self.job || self.is_terminal() {
            return;
        }
        match event {
            LaunchEvent::Progress {
                stage,
                percent,
                detail,
                ..
            } => {
                self.stage = stage.clone();
                self.percent = self.percent.max((*percent).min(100));
                self.detail = detail.clone();
            }
            LaunchEvent::Log { line, .. } => {
                self.log.push(line.clone());
            }
            LaunchEvent::Done { ok, error, .. } => {
                if *ok {
                    self.percent = 100;
                    self.outcome = Some(JobOutcome::Success);
                } else {
                    self.outcome = Some(JobOutcome::Failed {
                        error: error.clone().unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
            }
        }
    }
}
