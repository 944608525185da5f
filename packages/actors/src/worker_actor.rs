//! Worker actor for executing jobs.

use std::sync::Arc;
use std::time::Duration;

use imagegen_core::Delivery;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::executor::{ExecutionOutcome, JobExecutor};
use crate::messages::{QueueMessage, WorkerMessage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    /// Queue actor reference.
    pub queue: ActorRef<QueueMessage>,
    /// Shared job executor.
    pub executor: Arc<JobExecutor>,
    /// Delay before asking an empty queue again.
    pub poll_interval: Duration,
    /// Jobs handled by this worker.
    pub handled: u64,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub queue: ActorRef<QueueMessage>,
    pub executor: Arc<JobExecutor>,
    pub poll_interval: Duration,
}

/// Worker actor that pulls deliveries from the queue and executes them.
pub struct WorkerActor;

impl WorkerActor {
    async fn handle_delivery(state: &mut WorkerActorState, delivery: Delivery) {
        let tag = delivery.tag;
        let job_id = delivery.message.job_id;

        let ack = match state.executor.execute(&delivery).await {
            Ok(outcome) => {
                state.handled += 1;
                match outcome {
                    ExecutionOutcome::Skipped { state: job_state } => {
                        tracing::debug!(
                            job_id = %job_id,
                            worker = %state.worker_id,
                            "Skipped duplicate delivery ({})",
                            job_state
                        );
                    }
                    other => {
                        tracing::debug!(job_id = %job_id, worker = %state.worker_id, "{:?}", other);
                    }
                }
                QueueMessage::Ack { tag }
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    worker = %state.worker_id,
                    "Returning job message to the queue: {}",
                    e
                );
                QueueMessage::Nack {
                    tag,
                    reason: e.to_string(),
                }
            }
        };

        if let Err(e) = state.queue.send_message(ack) {
            tracing::warn!(worker = %state.worker_id, "Queue gone before acknowledgement: {}", e);
        }
    }
}

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        myself.send_message(WorkerMessage::Poll)?;

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue: args.queue,
            executor: args.executor,
            poll_interval: args.poll_interval,
            handled: 0,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Worker {} stopped ({} jobs handled)",
            state.worker_id,
            state.handled
        );
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                let result = ractor::rpc::call(
                    &state.queue,
                    |reply| QueueMessage::RequestDelivery {
                        worker_id: state.worker_id.clone(),
                        reply,
                    },
                    Some(REQUEST_TIMEOUT),
                )
                .await;

                match result {
                    Ok(CallResult::Success(Some(delivery))) => {
                        Self::handle_delivery(state, delivery).await;
                        // More work may be waiting; ask again right away.
                        myself.send_message(WorkerMessage::Poll)?;
                    }
                    Ok(_) => {
                        let myself_clone = myself.clone();
                        let interval = state.poll_interval;
                        tokio::spawn(async move {
                            tokio::time::sleep(interval).await;
                            let _ = myself_clone.send_message(WorkerMessage::Poll);
                        });
                    }
                    Err(e) => {
                        tracing::info!("Worker {} stopping, queue unavailable: {}", state.worker_id, e);
                        myself.stop(None);
                    }
                }
            }
        }

        Ok(())
    }
}
