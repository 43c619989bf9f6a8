//! Normalized job status types
//!
//! Every backend maps its native lifecycle onto [`JobState`]; callers never see
//! pod phases or container states directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    QueuedHeld,
    Running,
    Suspended,
    Completed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::QueuedHeld => "queued_held",
            JobState::Running => "running",
            JobState::Suspended => "suspended",
            JobState::Completed => "completed",
        }
    }

    /// Whether the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to reach a running job (e.g. an interactive session)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Normalized snapshot of a job
///
/// Built fresh on every successful query and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub status: JobState,
    pub job_name: Option<String>,
    pub job_owner: Option<String>,
    pub submission_time: Option<DateTime<Utc>>,
    pub dispatch_time: Option<DateTime<Utc>>,
    /// Seconds between dispatch and now (or completion)
    pub wallclock_time: Option<i64>,
    pub connection: Option<ConnectionInfo>,
}

impl JobInfo {
    /// Info for a job whose pod no longer exists
    ///
    /// Pods disappear from the cluster once they are cleaned up, so absence is
    /// reported as a terminal state rather than an error.
    pub fn completed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobState::Completed,
            job_name: None,
            job_owner: None,
            submission_time: None,
            dispatch_time: None,
            wallclock_time: None,
            connection: None,
        }
    }
}
