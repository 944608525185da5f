//! Job submission and status routes.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use imagegen_core::{Job, JobId, JobOutcome, JobState};
use serde::{Deserialize, Serialize};

use crate::auth::ApiKey;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub task_id: String,
}

/// Result part of a status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResult {
    Image { url: String },
    Error { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub status: JobState,
    pub result: Option<TaskResult>,
}

impl From<&Job> for TaskStatusResponse {
    fn from(job: &Job) -> Self {
        let result = match &job.outcome {
            Some(JobOutcome::Image { image_ref }) => Some(TaskResult::Image {
                url: format!("/static/{image_ref}"),
            }),
            Some(JobOutcome::Error { detail }) => Some(TaskResult::Error {
                error: detail.clone(),
            }),
            None => None,
        };
        Self {
            status: job.state,
            result,
        }
    }
}

/// POST /generate -- register a job and return its id immediately.
pub async fn generate(
    _key: ApiKey,
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Json<GenerateResponse>> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let job_id = state
        .submitter
        .submit(&request.prompt, request.model.as_deref())
        .await?;

    Ok(Json(GenerateResponse {
        task_id: job_id.to_string(),
    }))
}

/// GET /tasks/{id}/status -- current state and result of a job.
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<TaskStatusResponse>> {
    let job_id = JobId::parse(&task_id).map_err(|_| AppError::NotFound("Job".into()))?;
    let job = state.jobs.get(job_id).await?;
    Ok(Json(TaskStatusResponse::from(&job)))
}
