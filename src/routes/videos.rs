use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::routes::ApiFailure;

/// GET /api/v1/videos/{video_id}: Bytes of a generated video.
pub async fn download_video(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiFailure> {
    let video = state
        .videos
        .get(video_id)
        .await
        .ok_or_else(|| ApiFailure::not_found("video not found"))?;
    Ok((
        [(header::CONTENT_TYPE, video.mime_type)],
        video.bytes.as_ref().clone(),
    ))
}
