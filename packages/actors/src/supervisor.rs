//! Supervisor actor for the queue and its workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use imagegen_core::QueueConfig;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorCell, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::task::JoinHandle;

use crate::executor::JobExecutor;
use crate::messages::{QueueMessage, SupervisorMessage, WorkerMessage};
use crate::persistence::StatePersistence;
use crate::queue_actor::{QueueActor, QueueActorState};
use crate::worker_actor::{WorkerActor, WorkerArgs};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub config: QueueConfig,
    pub executor: Arc<JobExecutor>,
    /// Where the queue snapshots unacknowledged messages, if anywhere.
    pub persistence: Option<StatePersistence>,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    config: QueueConfig,
    executor: Arc<JobExecutor>,
    queue: ActorRef<QueueMessage>,
    /// Live workers by actor id.
    workers: HashMap<ActorId, (String, ActorRef<WorkerMessage>)>,
    shutting_down: bool,
}

async fn spawn_worker(
    supervisor: ActorCell,
    state: &mut SupervisorState,
    worker_id: String,
) -> Result<(), ActorProcessingErr> {
    let args = WorkerArgs {
        worker_id: worker_id.clone(),
        queue: state.queue.clone(),
        executor: state.executor.clone(),
        poll_interval: Duration::from_millis(state.config.poll_interval_ms),
    };

    let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, supervisor)
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

    state.workers.insert(worker.get_id(), (worker_id, worker));
    Ok(())
}

/// Supervisor actor that owns the queue and keeps the worker pool full.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting job queue supervisor ({} workers)",
            args.config.concurrency
        );

        let mut queue_state =
            QueueActorState::new(args.config.clone()).with_registry(args.executor.jobs().clone());
        if let Some(persistence) = args.persistence {
            queue_state = queue_state.with_persistence(persistence);
        }
        let (queue, _handle) =
            Actor::spawn_linked(None, QueueActor, queue_state, myself.get_cell())
                .await
                .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn queue: {}", e)))?;

        let mut state = SupervisorState {
            config: args.config,
            executor: args.executor,
            queue,
            workers: HashMap::new(),
            shutting_down: false,
        };

        for n in 1..=state.config.concurrency.max(1) {
            spawn_worker(myself.get_cell(), &mut state, format!("worker-{}", n)).await?;
        }

        // Start periodic tick
        let myself_clone = myself.clone();
        let period = Duration::from_millis(state.config.tick_interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if myself_clone.send_message(SupervisorMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::GetQueue { reply } => {
                let _ = reply.send(state.queue.clone());
            }

            SupervisorMessage::WorkerCount { reply } => {
                let _ = reply.send(state.workers.len());
            }

            SupervisorMessage::Tick => {
                let _ = state.queue.send_message(QueueMessage::Tick);
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                state.shutting_down = true;

                for (_, (worker_id, worker)) in state.workers.drain() {
                    if let Err(e) = worker.stop_and_wait(None, Some(STOP_TIMEOUT)).await {
                        tracing::warn!("Worker {} did not stop cleanly: {}", worker_id, e);
                    }
                }

                // Leases still held are written back as pending by the queue.
                if let Err(e) = state.queue.stop_and_wait(None, Some(STOP_TIMEOUT)).await {
                    tracing::warn!("Job queue did not stop cleanly: {}", e);
                }
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, err) => {
                if cell.get_id() == state.queue.get_id() {
                    tracing::error!("Job queue failed: {}", err);
                    myself.stop(Some("job queue failed".to_string()));
                    return Ok(());
                }

                if let Some((worker_id, _)) = state.workers.remove(&cell.get_id()) {
                    tracing::error!("Worker {} failed: {}", worker_id, err);
                    if !state.shutting_down {
                        tracing::info!("Restarting worker {}", worker_id);
                        spawn_worker(myself.get_cell(), state, worker_id).await?;
                    }
                }
            }

            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some((worker_id, _)) = state.workers.remove(&cell.get_id()) {
                    tracing::warn!("Worker {} terminated: {:?}", worker_id, reason);
                    if !state.shutting_down {
                        spawn_worker(myself.get_cell(), state, worker_id).await?;
                    }
                } else if cell.get_id() == state.queue.get_id() && !state.shutting_down {
                    tracing::error!("Job queue terminated: {:?}", reason);
                    myself.stop(Some("job queue terminated".to_string()));
                }
            }

            _ => {}
        }
        Ok(())
    }
}

/// Handles to a running job runtime.
pub struct JobRuntime {
    pub supervisor: ActorRef<SupervisorMessage>,
    pub queue: ActorRef<QueueMessage>,
    pub handle: JoinHandle<()>,
}

impl JobRuntime {
    /// Number of live workers.
    pub async fn worker_count(&self) -> Option<usize> {
        match ractor::rpc::call(
            &self.supervisor,
            |reply| SupervisorMessage::WorkerCount { reply },
            Some(Duration::from_secs(5)),
        )
        .await
        {
            Ok(CallResult::Success(count)) => Some(count),
            _ => None,
        }
    }

    /// Stop the workers and the queue, then wait for the supervisor to exit.
    pub async fn shutdown(self) {
        if self
            .supervisor
            .send_message(SupervisorMessage::Shutdown)
            .is_ok()
        {
            let _ = self.handle.await;
        }
    }
}

/// Runtime startup errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to start job runtime: {0}")]
    Spawn(#[from] ractor::SpawnErr),

    #[error("job runtime unavailable: {0}")]
    Unavailable(String),
}

/// Start the supervisor, the queue and the worker pool.
pub async fn start_supervisor(args: SupervisorArgs) -> Result<JobRuntime, RuntimeError> {
    let (supervisor, handle) = Actor::spawn(None, Supervisor, args).await?;

    let queue = match ractor::rpc::call(
        &supervisor,
        |reply| SupervisorMessage::GetQueue { reply },
        Some(Duration::from_secs(5)),
    )
    .await
    {
        Ok(CallResult::Success(queue)) => queue,
        Ok(_) => return Err(RuntimeError::Unavailable("no reply from supervisor".into())),
        Err(e) => return Err(RuntimeError::Unavailable(e.to_string())),
    };

    Ok(JobRuntime {
        supervisor,
        queue,
        handle,
    })
}
