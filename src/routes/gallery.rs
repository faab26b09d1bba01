use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use crate::app_state::AppState;
use crate::models::frame::FrameId;
use crate::models::requests::{FrameSummary, GalleryResponse, SelectionResponse};
use crate::routes::ApiFailure;
use crate::services::capture::{self, RasterSurface};

/// GET /api/v1/gallery: All frames in order plus the current selection.
pub async fn list_frames(State(state): State<AppState>) -> Json<GalleryResponse> {
    let gallery = state.gallery.read().await;
    Json(GalleryResponse {
        frames: gallery.frames().iter().map(FrameSummary::from).collect(),
        selected_id: gallery.selected_id().cloned(),
    })
}

/// POST /api/v1/gallery/capture: Capture an uploaded still as a frame.
///
/// Multipart fields: `frame` (image bytes), `timestamp` (seconds, default 0)
/// and `origin_clean` (default true).
pub async fn capture_frame(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FrameSummary>), ApiFailure> {
    let mut frame_bytes: Option<Vec<u8>> = None;
    let mut timestamp = 0.0_f64;
    let mut origin_clean = true;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiFailure::bad_request(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("frame") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiFailure::bad_request(e.to_string()))?;
                image::guess_format(&data).map_err(|_| {
                    ApiFailure::new(
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        "unsupported_media_type",
                        "frame is not a recognised image format",
                    )
                })?;
                frame_bytes = Some(data.to_vec());
            }
            Some("timestamp") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiFailure::bad_request(e.to_string()))?;
                timestamp = text
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|t| t.is_finite() && *t >= 0.0)
                    .ok_or_else(|| ApiFailure::bad_request("timestamp must be a non-negative number"))?;
            }
            Some("origin_clean") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiFailure::bad_request(e.to_string()))?;
                origin_clean = text
                    .trim()
                    .parse::<bool>()
                    .map_err(|_| ApiFailure::bad_request("origin_clean must be true or false"))?;
            }
            _ => {}
        }
    }

    let frame_bytes = frame_bytes.ok_or_else(|| ApiFailure::bad_request("missing `frame` field"))?;
    let surface = RasterSurface::decode(&frame_bytes, origin_clean).map_err(|e| {
        ApiFailure::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type", e.to_string())
    })?;

    let frame = match capture::capture(&surface, timestamp) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, timestamp, "Frame capture failed");
            return Err(e.into());
        }
    };

    let summary = FrameSummary::from(&frame);
    let mut gallery = state.gallery.write().await;
    gallery.add(frame);
    metrics::counter!("frames_captured_total").increment(1);
    metrics::gauge!("gallery_frames").set(gallery.len() as f64);
    tracing::info!(frame_id = %summary.id, timestamp, "Frame captured");

    Ok((StatusCode::CREATED, Json(summary)))
}

/// POST /api/v1/gallery/{frame_id}/select: Unknown ids leave the selection as is.
pub async fn select_frame(
    State(state): State<AppState>,
    Path(frame_id): Path<String>,
) -> Json<SelectionResponse> {
    let mut gallery = state.gallery.write().await;
    gallery.select(&FrameId::from(frame_id));
    Json(SelectionResponse {
        selected_id: gallery.selected_id().cloned(),
    })
}

/// DELETE /api/v1/gallery/{frame_id}
pub async fn delete_frame(
    State(state): State<AppState>,
    Path(frame_id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    let mut gallery = state.gallery.write().await;
    let removed = gallery
        .remove(&FrameId::from(frame_id))
        .ok_or_else(|| ApiFailure::not_found("frame not found"))?;
    metrics::gauge!("gallery_frames").set(gallery.len() as f64);
    tracing::info!(frame_id = %removed.id, "Frame removed");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/gallery/{frame_id}/image: Decoded image bytes.
pub async fn frame_image(
    State(state): State<AppState>,
    Path(frame_id): Path<String>,
) -> Result<impl IntoResponse, ApiFailure> {
    let gallery = state.gallery.read().await;
    let frame = gallery
        .get(&FrameId::from(frame_id))
        .ok_or_else(|| ApiFailure::not_found("frame not found"))?;
    let bytes = frame.image_data.decode().map_err(|e| {
        ApiFailure::new(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_image", e.to_string())
    })?;
    Ok(([(header::CONTENT_TYPE, frame.image_data.mime_type().to_string())], bytes))
}
