//! Shared handler state.

use std::sync::Arc;

use actors::JobSubmitter;
use db::repositories::JobRepository;
use imagegen_core::JobEvent;
use storage::ImageStore;
use tokio::sync::broadcast;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: every field is a handle.
#[derive(Clone)]
pub struct AppState {
    /// Registers and enqueues new jobs.
    pub submitter: JobSubmitter,
    /// Job status registry.
    pub jobs: JobRepository,
    /// Generated artifacts.
    pub images: ImageStore,
    /// Accepted `X-API-KEY` values; empty accepts any non-empty key.
    pub api_keys: Arc<Vec<String>>,
    /// Job lifecycle events.
    pub events: broadcast::Sender<JobEvent>,
}
