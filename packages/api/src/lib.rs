//! HTTP surface of the image generation job service.
//!
//! - `POST /generate` submits a prompt and returns a task id
//! - `GET /tasks/{id}/status` reports the job state and result
//! - `GET /static/{filename}` serves generated images
//! - `GET /events` streams job lifecycle events (SSE)
//! - `GET /health` liveness

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod images;
mod init;
pub mod jobs;
pub mod realtime;
pub mod state;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::{AppConfig, ConfigError};
pub use error::{AppError, AppResult};
pub use init::{InitError, Services, init_services};
pub use state::AppState;

/// Build the application router with its middleware stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/generate", post(jobs::generate))
        .route("/tasks/{task_id}/status", get(jobs::task_status))
        .route("/static/{filename}", get(images::get_image))
        .route("/events", get(realtime::events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
