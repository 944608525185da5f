//! Event types for job lifecycle observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, JobState};

/// Events emitted by the job status registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was recorded as pending.
    JobSubmitted {
        job_id: JobId,
        model: String,
        timestamp: DateTime<Utc>,
    },
    /// A job moved to a new state.
    JobStateChanged {
        job_id: JobId,
        from: JobState,
        to: JobState,
        timestamp: DateTime<Utc>,
    },
    /// A state write was refused because it would break monotonicity.
    TransitionRejected {
        job_id: JobId,
        current: JobState,
        attempted: JobState,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobSubmitted { timestamp, .. } => *timestamp,
            JobEvent::JobStateChanged { timestamp, .. } => *timestamp,
            JobEvent::TransitionRejected { timestamp, .. } => *timestamp,
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobSubmitted { job_id, .. } => *job_id,
            JobEvent::JobStateChanged { job_id, .. } => *job_id,
            JobEvent::TransitionRejected { job_id, .. } => *job_id,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobSubmitted { job_id, model, .. } => {
                format!("Job {} submitted for model {}", job_id, model)
            }
            JobEvent::JobStateChanged {
                job_id, from, to, ..
            } => format!("Job {} {} -> {}", job_id, from, to),
            JobEvent::TransitionRejected {
                job_id,
                current,
                attempted,
                ..
            } => format!(
                "Job {} refused {} while {}",
                job_id, attempted, current
            ),
        }
    }
}
