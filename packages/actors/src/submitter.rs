//! Job submission: register a PENDING job and enqueue it.

use std::time::Duration;

use db::DbError;
use db::repositories::JobRepository;
use imagegen_core::{DEFAULT_MODEL, Job, JobId, JobMessage};
use ractor::ActorRef;
use ractor::rpc::CallResult;

use crate::messages::QueueMessage;

/// Submission errors.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(String),

    #[error("job queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error(transparent)]
    Registry(#[from] DbError),
}

/// Accepts prompts and hands them to the job queue.
#[derive(Clone)]
pub struct JobSubmitter {
    jobs: JobRepository,
    queue: ActorRef<QueueMessage>,
    default_model: String,
    enqueue_timeout: Duration,
}

impl JobSubmitter {
    pub fn new(jobs: JobRepository, queue: ActorRef<QueueMessage>) -> Self {
        Self {
            jobs,
            queue,
            default_model: DEFAULT_MODEL.to_string(),
            enqueue_timeout: Duration::from_secs(5),
        }
    }

    /// Model used when a submission names none.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Submit a prompt and return the new job's id without waiting for it.
    ///
    /// The job record is removed again if the queue does not accept the
    /// message, so a failed submission leaves nothing behind.
    pub async fn submit(&self, prompt: &str, model: Option<&str>) -> Result<JobId, SubmitError> {
        if prompt.trim().is_empty() {
            return Err(SubmitError::Validation("prompt must not be empty".into()));
        }
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model);

        let job = self.jobs.create(&Job::new(prompt, model)).await?;
        let message = JobMessage {
            job_id: job.id,
            prompt: job.prompt.clone(),
            model: job.model.clone(),
        };

        if let Err(reason) = self.enqueue(message).await {
            tracing::warn!(job_id = %job.id, "Enqueue failed, removing job: {}", reason);
            if let Err(e) = self.jobs.delete(job.id).await {
                tracing::error!(job_id = %job.id, "Failed to remove unqueued job: {}", e);
            }
            return Err(SubmitError::QueueUnavailable(reason));
        }

        tracing::info!(job_id = %job.id, model = %job.model, "Job submitted");
        Ok(job.id)
    }

    async fn enqueue(&self, message: JobMessage) -> Result<(), String> {
        let result = ractor::rpc::call(
            &self.queue,
            |reply| QueueMessage::Enqueue { message, reply },
            Some(self.enqueue_timeout),
        )
        .await
        .map_err(|e| e.to_string())?;

        match result {
            CallResult::Success(Ok(())) => Ok(()),
            CallResult::Success(Err(e)) => Err(e.to_string()),
            CallResult::Timeout => Err("timed out waiting for the queue".into()),
            CallResult::SenderError => Err("queue dropped the request".into()),
        }
    }
}
