//! Queue actor: at-least-once delivery of job messages to workers.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use db::repositories::{JobRepository, Transition};
use imagegen_core::{Delivery, JobId, JobMessage, QueueConfig, QueueStats};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use serde::{Deserialize, Serialize};

use crate::messages::{EnqueueError, QueueMessage};
use crate::persistence::StatePersistence;

const SNAPSHOT_NAME: &str = "queue";

/// A message waiting for a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PendingMessage {
    message: JobMessage,
    /// Deliveries made so far.
    deliveries: u32,
}

/// On-disk form of the queue: everything not yet acknowledged.
#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueSnapshot {
    messages: Vec<PendingMessage>,
}

/// A delivery held by a worker.
#[derive(Debug, Clone)]
struct Lease {
    delivery: Delivery,
    worker_id: String,
    leased_at: Instant,
}

/// State for the queue actor.
pub struct QueueActorState {
    config: QueueConfig,
    pending: VecDeque<PendingMessage>,
    in_flight: HashMap<u64, Lease>,
    next_tag: u64,
    accepting: bool,
    stats: QueueStats,
    persistence: Option<StatePersistence>,
    /// Registry that records dead-lettered jobs as FAILED.
    registry: Option<JobRepository>,
    /// Dead-lettered jobs not yet recorded as FAILED, with the failure detail.
    dead_letters: Vec<(JobId, String)>,
}

impl QueueActorState {
    /// Create a new queue actor state.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            next_tag: 1,
            accepting: true,
            stats: QueueStats::default(),
            persistence: None,
            registry: None,
            dead_letters: Vec::new(),
        }
    }

    /// Snapshot outstanding messages to disk after every change.
    pub fn with_persistence(mut self, persistence: StatePersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Mark jobs FAILED in `registry` when their message is dead-lettered.
    pub fn with_registry(mut self, registry: JobRepository) -> Self {
        self.registry = Some(registry);
        self
    }

    fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.config.visibility_timeout_secs)
    }

    fn push(&mut self, message: JobMessage) -> Result<(), EnqueueError> {
        if !self.accepting {
            return Err(EnqueueError::NotAccepting);
        }
        if let Some(max_size) = self.config.max_queue_size
            && self.pending.len() >= max_size
        {
            return Err(EnqueueError::QueueFull);
        }
        self.pending.push_back(PendingMessage {
            message,
            deliveries: 0,
        });
        Ok(())
    }

    fn lease(&mut self, worker_id: String, now: Instant) -> Option<Delivery> {
        let next = self.pending.pop_front()?;
        let tag = self.next_tag;
        self.next_tag += 1;

        let delivery = Delivery {
            tag,
            attempt: next.deliveries + 1,
            message: next.message,
        };
        self.in_flight.insert(
            tag,
            Lease {
                delivery: delivery.clone(),
                worker_id,
                leased_at: now,
            },
        );
        Some(delivery)
    }

    fn ack(&mut self, tag: u64) -> bool {
        if self.in_flight.remove(&tag).is_some() {
            self.stats.acked += 1;
            true
        } else {
            false
        }
    }

    fn nack(&mut self, tag: u64, reason: &str) -> bool {
        match self.in_flight.remove(&tag) {
            Some(lease) => {
                self.redeliver(lease, reason);
                true
            }
            None => false,
        }
    }

    /// Return leases older than the visibility timeout to the queue.
    fn expire_leases(&mut self, now: Instant) -> usize {
        let timeout = self.visibility_timeout();
        let expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, lease)| now.saturating_duration_since(lease.leased_at) >= timeout)
            .map(|(tag, _)| *tag)
            .collect();

        for tag in &expired {
            if let Some(lease) = self.in_flight.remove(tag) {
                let reason = format!("lease held by {} expired", lease.worker_id);
                self.redeliver(lease, &reason);
            }
        }
        expired.len()
    }

    fn redeliver(&mut self, lease: Lease, reason: &str) {
        let delivery = lease.delivery;
        let job_id = delivery.message.job_id;

        if delivery.attempt >= self.config.max_deliveries {
            self.stats.dead_lettered += 1;
            tracing::error!(
                job_id = %job_id,
                attempts = delivery.attempt,
                reason,
                "Dead-lettering job message"
            );
            self.dead_letters.push((
                job_id,
                format!("gave up after {} deliveries: {}", delivery.attempt, reason),
            ));
            return;
        }

        tracing::warn!(
            job_id = %job_id,
            attempt = delivery.attempt,
            reason,
            "Redelivering job message"
        );
        self.stats.redelivered += 1;
        self.pending.push_back(PendingMessage {
            message: delivery.message,
            deliveries: delivery.attempt,
        });
    }

    /// Record dead-lettered jobs as FAILED so they do not stay live forever.
    ///
    /// A job that already reached a terminal state is left as it is.
    async fn fail_dead_letters(&mut self) {
        let dead_letters = std::mem::take(&mut self.dead_letters);
        let Some(ref registry) = self.registry else {
            return;
        };

        for (job_id, detail) in dead_letters {
            match registry.set_failed(job_id, detail).await {
                Ok(Transition::Applied(_)) => {
                    tracing::warn!(job_id = %job_id, "Dead-lettered job marked FAILED");
                }
                Ok(Transition::Rejected(job)) => {
                    tracing::debug!(job_id = %job_id, state = %job.state, "Dead-lettered job already finished");
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, "Failed to mark dead-lettered job FAILED: {}", e);
                }
            }
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        let mut leased: Vec<&Lease> = self.in_flight.values().collect();
        leased.sort_by_key(|lease| lease.delivery.tag);

        let messages = leased
            .into_iter()
            .map(|lease| PendingMessage {
                message: lease.delivery.message.clone(),
                deliveries: lease.delivery.attempt,
            })
            .chain(self.pending.iter().cloned())
            .collect();
        QueueSnapshot { messages }
    }

    fn restore(&mut self, snapshot: QueueSnapshot) {
        self.pending = snapshot.messages.into();
    }

    async fn persist(&self) -> Result<(), EnqueueError> {
        let Some(ref persistence) = self.persistence else {
            return Ok(());
        };
        persistence
            .save(SNAPSHOT_NAME, &self.snapshot())
            .await
            .map_err(|e| EnqueueError::Persistence(e.to_string()))
    }

    async fn persist_or_warn(&self) {
        if let Err(e) = self.persist().await {
            tracing::warn!("Failed to persist queue state: {}", e);
        }
    }

    /// Current counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len() as u64,
            in_flight: self.in_flight.len() as u64,
            ..self.stats.clone()
        }
    }
}

/// Queue actor that hands job messages to workers.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        mut args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        if let Some(ref persistence) = args.persistence {
            persistence.init().await?;
            if let Some(snapshot) = persistence.load::<QueueSnapshot>(SNAPSHOT_NAME).await? {
                tracing::info!(
                    "Restored {} queued job messages from {:?}",
                    snapshot.messages.len(),
                    persistence.base_dir()
                );
                args.restore(snapshot);
            }
        }

        tracing::info!("Starting job queue");
        Ok(args)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.accepting = false;
        state.persist_or_warn().await;
        let stats = state.stats();
        tracing::info!(
            "Job queue stopped with {} outstanding messages",
            stats.outstanding()
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
            QueueMessage::Enqueue { message, reply } => {
                let job_id = message.job_id;
                let result = match state.push(message) {
                    Ok(()) => match state.persist().await {
                        Ok(()) => Ok(()),
                        Err(e) => {
                            state.pending.pop_back();
                            Err(e)
                        }
                    },
                    Err(e) => Err(e),
                };

                match &result {
                    Ok(()) => tracing::debug!(job_id = %job_id, "Job message enqueued"),
                    Err(e) => tracing::warn!(job_id = %job_id, "Refused job message: {}", e),
                }
                let _ = reply.send(result);
            }

            QueueMessage::RequestDelivery { worker_id, reply } => {
                let delivery = state.lease(worker_id, Instant::now());
                if delivery.is_some() {
                    state.persist_or_warn().await;
                }
                let _ = reply.send(delivery);
            }

            QueueMessage::Ack { tag } => {
                if state.ack(tag) {
                    state.persist_or_warn().await;
                } else {
                    tracing::debug!("Ack for unknown delivery {}", tag);
                }
            }

            QueueMessage::Nack { tag, reason } => {
                if state.nack(tag, &reason) {
                    state.fail_dead_letters().await;
                    state.persist_or_warn().await;
                } else {
                    tracing::debug!("Nack for unknown delivery {}", tag);
                }
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down job queue");
                state.accepting = false;
                myself.stop(None);
                return Ok(());
            }

            QueueMessage::Tick => {
                if state.expire_leases(Instant::now()) > 0 {
                    state.fail_dead_letters().await;
                    state.persist_or_warn().await;
                }
            }
        }

        Ok(())
    }
}
