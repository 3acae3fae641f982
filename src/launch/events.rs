//! Launch job event protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted while a launch job runs.
///
/// Zero or more `Progress`/`Log` events arrive in any interleaving, then
/// exactly one `Done` marks the job terminal. Every event carries the job
/// id so events from a superseded job are never attributed to a newer one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchEvent {
    Progress {
        job: Uuid,
        stage: String,
        percent: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Log {
        job: Uuid,
        line: String,
    },
    Done {
        job: Uuid,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl LaunchEvent {
    pub fn job(&self) -> Uuid {
        match self {
            LaunchEvent::Progress { job, .. }
            | LaunchEvent::Log { job, .. }
            | LaunchEvent::Done { job, .. } => *job,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LaunchEvent::Done { .. })
    }
}

/// How a job ended. `Failed` always carries error text, so a failed `Done`
/// can never be emitted without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failed { error: String },
}

impl JobOutcome {
    pub fn ok(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Success => None,
            JobOutcome::Failed { error } => Some(error),
        }
    }
}
