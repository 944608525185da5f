//! Serving stored images.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /static/{filename} -- bytes of a generated image.
pub async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    let bytes = state.images.get(&filename).await?;
    Ok((
        [(header::CONTENT_TYPE, storage::content_type_for(&filename))],
        bytes,
    ))
}
