//! Queue message and configuration types.

use serde::{Deserialize, Serialize};

use crate::JobId;

/// The job description carried from submitters to workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
    pub prompt: String,
    pub model: String,
}

/// One hand-off of a queued message to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Queue-assigned tag used to ack or nack this delivery.
    pub tag: u64,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
    pub message: JobMessage,
}

impl Delivery {
    /// Whether this message has been handed out before.
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

/// Configuration for queue and worker behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of concurrent workers.
    pub concurrency: u32,
    /// Upper bound on deliveries per message before it is dead-lettered.
    pub max_deliveries: u32,
    /// How long a delivery may stay unacknowledged before redelivery.
    pub visibility_timeout_secs: u64,
    /// Maximum number of messages waiting in the queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queue_size: Option<usize>,
    /// Idle worker poll interval.
    pub poll_interval_ms: u64,
    /// Housekeeping interval for lease expiry.
    pub tick_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_deliveries: 3,
            visibility_timeout_secs: 120,
            max_queue_size: None,
            poll_interval_ms: 100,
            tick_interval_ms: 1000,
        }
    }
}

/// Counters for a queue's current state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub pending: u64,
    pub in_flight: u64,
    pub acked: u64,
    pub redelivered: u64,
    pub dead_lettered: u64,
}

impl QueueStats {
    /// Messages not yet acknowledged.
    pub fn outstanding(&self) -> u64 {
        self.pending + self.in_flight
    }
}
