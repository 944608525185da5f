//! Core domain types for the image generation job service.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobState and JobOutcome for generation requests
//! - Queue messages, deliveries and queue configuration
//! - Events for lifecycle observation

mod events;
mod job;
mod queue;

pub use events::JobEvent;
pub use job::{Job, JobId, JobOutcome, JobState, redact_prompt};
pub use queue::{Delivery, JobMessage, QueueConfig, QueueStats};

/// Model used when a submission does not name one.
pub const DEFAULT_MODEL: &str = "stable-diffusion";
