//! Actor system for the image generation job queue.
//!
//! This crate provides the Ractor-based runtime that moves jobs from
//! submission to a terminal state.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor that owns the queue and keeps the worker pool full
//! - `QueueActor` - At-least-once delivery of job messages, with leases and redelivery
//! - `WorkerActor` - Pulls deliveries and runs them through the `JobExecutor`
//!
//! # Usage
//!
//! ```ignore
//! use actors::{JobExecutor, JobSubmitter, SupervisorArgs, start_supervisor};
//!
//! let executor = Arc::new(JobExecutor::new(jobs.clone(), images, backend));
//! let runtime = start_supervisor(SupervisorArgs { config, executor, persistence: None }).await?;
//!
//! let submitter = JobSubmitter::new(jobs, runtime.queue.clone());
//! let job_id = submitter.submit("a red fox", None).await?;
//! ```

mod executor;
mod messages;
mod persistence;
mod queue_actor;
mod submitter;
mod supervisor;
mod worker_actor;

pub use executor::{
    DEFAULT_GENERATION_TIMEOUT, ExecutionFailure, ExecutionOutcome, ExecutorError, JobExecutor,
};
pub use messages::{EnqueueError, QueueMessage, SupervisorMessage, WorkerMessage};
pub use persistence::{PersistenceError, StatePersistence};
pub use queue_actor::{QueueActor, QueueActorState};
pub use submitter::{JobSubmitter, SubmitError};
pub use supervisor::{JobRuntime, RuntimeError, Supervisor, SupervisorArgs, start_supervisor};
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
