//! Message types for actor communication.

use imagegen_core::{Delivery, JobMessage, QueueStats};
use ractor::{ActorRef, RpcReplyPort};

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Accept a new job message.
    Enqueue {
        message: JobMessage,
        reply: RpcReplyPort<Result<(), EnqueueError>>,
    },

    /// Lease the next message to a worker.
    RequestDelivery {
        worker_id: String,
        reply: RpcReplyPort<Option<Delivery>>,
    },

    /// The delivery was handled; forget it.
    Ack { tag: u64 },

    /// The delivery could not be handled; redeliver within the bound.
    Nack { tag: u64, reason: String },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Stop accepting and shut down.
    Shutdown,

    /// Periodic tick for lease expiry.
    Tick,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Ask the queue for work.
    Poll,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Get the queue actor.
    GetQueue {
        reply: RpcReplyPort<ActorRef<QueueMessage>>,
    },

    /// Number of live workers.
    WorkerCount { reply: RpcReplyPort<usize> },

    /// Shutdown the queue and all workers.
    Shutdown,

    /// Periodic tick for housekeeping.
    Tick,
}

/// Why the queue refused a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("Queue is not accepting messages")]
    NotAccepting,

    #[error("Queue is full")]
    QueueFull,

    #[error("Queue state could not be persisted: {0}")]
    Persistence(String),
}
