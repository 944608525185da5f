//! Job executor: runs one delivered job message to a terminal state.

use std::sync::Arc;
use std::time::Duration;

use backend::{BackendError, GenerationRequest, ImageBackend};
use db::DbError;
use db::repositories::{JobRepository, Transition};
use imagegen_core::{Delivery, Job, JobState, redact_prompt};
use storage::{ImageStore, StorageError};

/// Default bound on a single generation call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// What happened to a delivered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The image was stored and the job recorded as SUCCEEDED.
    Succeeded { image_ref: String },
    /// The job was recorded as FAILED.
    Failed { detail: String },
    /// The job was already being handled or finished; nothing was done.
    Skipped { state: JobState },
    /// The registry has no such job; the message is dropped.
    Discarded,
}

/// Why a job ended in FAILED.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionFailure {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to store image: {0}")]
    Store(#[from] StorageError),
}

impl ExecutionFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionFailure::Backend(e) => e.kind(),
            ExecutionFailure::Store(_) => "store",
        }
    }
}

/// The job could not be driven to an outcome; the message should be redelivered.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("job registry unavailable: {0}")]
    Registry(#[from] DbError),
}

/// Executes jobs against the generation backend.
///
/// Shared read-only between workers; all coordination goes through the
/// registry's conditional state writes.
pub struct JobExecutor {
    jobs: JobRepository,
    images: ImageStore,
    backend: Arc<dyn ImageBackend>,
    timeout: Duration,
}

impl JobExecutor {
    pub fn new(jobs: JobRepository, images: ImageStore, backend: Arc<dyn ImageBackend>) -> Self {
        Self {
            jobs,
            images,
            backend,
            timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    /// Set the generation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The job registry this executor writes to.
    pub fn jobs(&self) -> &JobRepository {
        &self.jobs
    }

    /// Execute a delivered job message.
    ///
    /// Backend and store failures end the job in FAILED and are returned as
    /// an outcome. Only registry failures are returned as errors.
    pub async fn execute(&self, delivery: &Delivery) -> Result<ExecutionOutcome, ExecutorError> {
        let job_id = delivery.message.job_id;

        let job = match self.jobs.get(job_id).await {
            Ok(job) => job,
            Err(DbError::NotFound(_)) => {
                tracing::warn!(job_id = %job_id, "Discarding message for unknown job");
                return Ok(ExecutionOutcome::Discarded);
            }
            Err(e) => return Err(e.into()),
        };

        let job = match job.state {
            state if state.is_terminal() => {
                tracing::debug!(job_id = %job_id, %state, "Job already finished");
                return Ok(ExecutionOutcome::Skipped { state });
            }
            JobState::Running if !delivery.is_redelivery() => {
                tracing::debug!(job_id = %job_id, "Job already running");
                return Ok(ExecutionOutcome::Skipped {
                    state: JobState::Running,
                });
            }
            JobState::Running => {
                // The previous holder's lease expired or was nacked.
                tracing::warn!(
                    job_id = %job_id,
                    attempt = delivery.attempt,
                    "Reclaiming job left running by an earlier delivery"
                );
                job
            }
            _ => match self.jobs.set_running(job_id).await? {
                Transition::Applied(job) => job,
                Transition::Rejected(current) => {
                    return Ok(ExecutionOutcome::Skipped {
                        state: current.state,
                    });
                }
            },
        };

        tracing::info!(
            job_id = %job_id,
            model = %job.model,
            attempt = delivery.attempt,
            "Generating image"
        );

        match self.generate(&job).await {
            Ok(image_ref) => match self.jobs.set_succeeded(job_id, image_ref.clone()).await? {
                Transition::Applied(_) => {
                    tracing::info!(job_id = %job_id, image_ref = %image_ref, "Job succeeded");
                    Ok(ExecutionOutcome::Succeeded { image_ref })
                }
                Transition::Rejected(current) => Ok(ExecutionOutcome::Skipped {
                    state: current.state,
                }),
            },
            Err(failure) => {
                let detail = failure.to_string();
                tracing::error!(
                    job_id = %job_id,
                    prompt = %redact_prompt(&job.prompt),
                    kind = failure.kind(),
                    error = %detail,
                    "Job failed"
                );
                match self.jobs.set_failed(job_id, detail.clone()).await? {
                    Transition::Applied(_) => Ok(ExecutionOutcome::Failed { detail }),
                    Transition::Rejected(current) => Ok(ExecutionOutcome::Skipped {
                        state: current.state,
                    }),
                }
            }
        }
    }

    async fn generate(&self, job: &Job) -> Result<String, ExecutionFailure> {
        let request = GenerationRequest::new(job.prompt.as_str(), job.model.as_str());

        let image = tokio::time::timeout(self.timeout, self.backend.generate(&request, self.timeout))
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))??;

        let name = self.images.put(image.bytes, image.extension).await?;
        Ok(name)
    }
}
