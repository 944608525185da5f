//! Job repository: the durable job status registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use imagegen_core::{Job, JobEvent, JobId, JobOutcome, JobState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{Database, DbError};

/// Result of a conditional state write.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The write was applied; holds the job as it is now.
    Applied(Job),
    /// The job was in a state the write may not leave; holds it unchanged.
    Rejected(Job),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn job(&self) -> &Job {
        match self {
            Transition::Applied(job) | Transition::Rejected(job) => job,
        }
    }
}

/// Row layout of the `job` table.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    job_id: String,
    prompt: String,
    model: String,
    state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRecord {
    fn from_job(job: &Job) -> Self {
        let (image_ref, error) = match &job.outcome {
            Some(JobOutcome::Image { image_ref }) => (Some(image_ref.clone()), None),
            Some(JobOutcome::Error { detail }) => (None, Some(detail.clone())),
            None => (None, None),
        };
        Self {
            job_id: job.id.to_string(),
            prompt: job.prompt.clone(),
            model: job.model.clone(),
            state: job.state,
            image_ref,
            error,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }

    fn into_job(self) -> Result<Job, DbError> {
        let id = JobId::parse(&self.job_id)
            .map_err(|e| DbError::Corrupt(format!("job id {}: {}", self.job_id, e)))?;

        let outcome = match (self.state, self.image_ref, self.error) {
            (JobState::Succeeded, Some(image_ref), _) => Some(JobOutcome::Image { image_ref }),
            (JobState::Failed, _, Some(detail)) => Some(JobOutcome::Error { detail }),
            (JobState::Pending | JobState::Running, _, _) => None,
            (state, _, _) => {
                return Err(DbError::Corrupt(format!(
                    "job {} is {} without a result",
                    id, state
                )));
            }
        };

        Ok(Job {
            id,
            prompt: self.prompt,
            model: self.model,
            state: self.state,
            outcome,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Attempts at a conditional write that loses a transaction race.
const CONFLICT_RETRIES: u32 = 5;

/// Optimistic transaction conflicts can be retried; the WHERE clause is
/// re-evaluated against the winner's write.
fn is_retryable(err: &surrealdb::Error) -> bool {
    let msg = err.to_string();
    msg.contains("can be retried") || msg.contains("conflict")
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("timestamp {raw}: {e}")))
}

/// Repository for job persistence operations.
///
/// All state writes are conditional on the current state, so concurrent
/// workers cannot move a job backwards or out of a terminal state.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
    events: Option<broadcast::Sender<JobEvent>>,
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db, events: None }
    }

    /// Publish submissions and transitions on the given channel.
    pub fn with_events(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn publish(&self, event: JobEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    /// Create a new job in the database.
    pub async fn create(&self, job: &Job) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self
            .db
            .create(("job", job.id.to_string()))
            .content(JobRecord::from_job(job))
            .await?;

        let created = record
            .ok_or_else(|| DbError::Query("Failed to create job".into()))?
            .into_job()?;

        self.publish(JobEvent::JobSubmitted {
            job_id: created.id,
            model: created.model.clone(),
            timestamp: Utc::now(),
        });

        Ok(created)
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self.db.select(("job", id.to_string())).await?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?
            .into_job()
    }

    /// Delete a job.
    ///
    /// Only used to undo a submission whose message never reached the queue.
    pub async fn delete(&self, id: JobId) -> Result<(), DbError> {
        let _: Option<JobRecord> = self.db.delete(("job", id.to_string())).await?;
        Ok(())
    }

    /// Move a pending job to running.
    pub async fn set_running(&self, id: JobId) -> Result<Transition, DbError> {
        self.transition(id, JobState::Running, None).await
    }

    /// Record a successful result.
    pub async fn set_succeeded(
        &self,
        id: JobId,
        image_ref: impl Into<String>,
    ) -> Result<Transition, DbError> {
        let outcome = JobOutcome::Image {
            image_ref: image_ref.into(),
        };
        self.transition(id, JobState::Succeeded, Some(outcome)).await
    }

    /// Record a failure.
    pub async fn set_failed(
        &self,
        id: JobId,
        detail: impl Into<String>,
    ) -> Result<Transition, DbError> {
        let outcome = JobOutcome::Error {
            detail: detail.into(),
        };
        self.transition(id, JobState::Failed, Some(outcome)).await
    }

    async fn transition(
        &self,
        id: JobId,
        to: JobState,
        outcome: Option<JobOutcome>,
    ) -> Result<Transition, DbError> {
        let now = Utc::now();

        let result_assignment = match &outcome {
            Some(JobOutcome::Image { .. }) => ", image_ref = $result",
            Some(JobOutcome::Error { .. }) => ", error = $result",
            None => "",
        };
        let query = format!(
            "UPDATE type::thing('job', $id) \
             SET state = $to, updated_at = $now{result_assignment} \
             WHERE state IN $from RETURN BEFORE"
        );

        let result = match &outcome {
            Some(JobOutcome::Image { image_ref }) => Some(image_ref.clone()),
            Some(JobOutcome::Error { detail }) => Some(detail.clone()),
            None => None,
        };

        let mut attempt = 1;
        let before: Vec<JobRecord> = loop {
            let mut request = self
                .db
                .query(query.as_str())
                .bind(("id", id.to_string()))
                .bind(("to", to))
                .bind(("now", now.to_rfc3339()))
                .bind(("from", JobState::sources_of(to)));
            if let Some(ref result) = result {
                request = request.bind(("result", result.clone()));
            }

            let written = async { request.await?.take::<Vec<JobRecord>>(0) }.await;
            match written {
                Ok(before) => break before,
                Err(e) if attempt < CONFLICT_RETRIES && is_retryable(&e) => {
                    tracing::debug!(job_id = %id, attempt, "Retrying conflicting state write");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let Some(previous) = before.into_iter().next() else {
            let current = self.get(id).await?;
            tracing::warn!(
                job_id = %id,
                current = %current.state,
                attempted = %to,
                "Rejected job state transition"
            );
            self.publish(JobEvent::TransitionRejected {
                job_id: id,
                current: current.state,
                attempted: to,
                timestamp: now,
            });
            return Ok(Transition::Rejected(current));
        };

        let previous = previous.into_job()?;
        let from = previous.state;

        let mut job = previous;
        job.state = to;
        job.updated_at = now;
        if outcome.is_some() {
            job.outcome = outcome;
        }

        tracing::debug!(job_id = %id, %from, %to, "Job state changed");
        self.publish(JobEvent::JobStateChanged {
            job_id: id,
            from,
            to,
            timestamp: now,
        });

        Ok(Transition::Applied(job))
    }

    /// Count jobs by state.
    pub async fn count_by_state(&self) -> Result<HashMap<JobState, u64>, DbError> {
        let mut result = self
            .db
            .query("SELECT state, count() AS count FROM job GROUP BY state")
            .await?;

        #[derive(Deserialize)]
        struct StateCount {
            state: JobState,
            count: i64,
        }

        let counts: Vec<StateCount> = result.take(0)?;

        Ok(counts
            .into_iter()
            .map(|c| (c.state, c.count.max(0) as u64))
            .collect())
    }
}
