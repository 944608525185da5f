//! Service initialization for the image generation job service.

use std::sync::Arc;

use actors::{
    JobExecutor, JobRuntime, JobSubmitter, RuntimeError, StatePersistence, SupervisorArgs,
    start_supervisor,
};
use backend::ImageBackend;
use db::DbError;
use db::repositories::JobRepository;
use imagegen_core::JobEvent;
use storage::{ImageStore, StorageError};
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::state::AppState;

/// Capacity of the job event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to initialize job registry: {0}")]
    Database(#[from] DbError),

    #[error("failed to initialize image store: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Running services: HTTP state plus the job runtime behind it.
pub struct Services {
    pub state: AppState,
    pub runtime: JobRuntime,
}

impl Services {
    /// Stop the workers and the queue.
    pub async fn shutdown(self) {
        self.runtime.shutdown().await;
        tracing::info!("Job runtime stopped");
    }
}

/// Initialize the job service.
///
/// This should be called once at server startup before handling requests.
pub async fn init_services(
    config: &AppConfig,
    backend: Arc<dyn ImageBackend>,
) -> Result<Services, InitError> {
    tracing::info!("Initializing image generation service...");

    let (events, _) = broadcast::channel::<JobEvent>(EVENT_CHANNEL_CAPACITY);

    let db = db::init(&config.db).await?;
    tracing::info!("Job registry ready ({})", config.db.endpoint);
    let jobs = JobRepository::new(db).with_events(events.clone());

    let images = ImageStore::new(config.storage.clone())?;

    let executor = JobExecutor::new(jobs.clone(), images.clone(), backend)
        .with_timeout(config.backend.timeout);

    let runtime = start_supervisor(SupervisorArgs {
        config: config.queue.clone(),
        executor: Arc::new(executor),
        persistence: config.queue_state_dir.as_ref().map(StatePersistence::new),
    })
    .await?;

    let submitter = JobSubmitter::new(jobs.clone(), runtime.queue.clone())
        .with_default_model(config.default_model.clone());

    let state = AppState {
        submitter,
        jobs,
        images,
        api_keys: Arc::new(config.api_keys.clone()),
        events,
    };

    tracing::info!(
        workers = config.queue.concurrency,
        endpoint = %config.backend.endpoint,
        "Image generation service initialized"
    );
    Ok(Services { state, runtime })
}
