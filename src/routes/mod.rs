use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::app_state::AppState;
use crate::models::job::JobSpecError;
use crate::services::capture::CaptureError;
use crate::services::credential::CredentialError;

pub mod credential;
pub mod gallery;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod videos;

/// API routes sharing [`AppState`]. The binary adds `/metrics` and the
/// tower layers on top.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/gallery", get(gallery::list_frames))
        .route("/api/v1/gallery/capture", post(gallery::capture_frame))
        .route("/api/v1/gallery/{frame_id}", axum::routing::delete(gallery::delete_frame))
        .route("/api/v1/gallery/{frame_id}/select", post(gallery::select_frame))
        .route("/api/v1/gallery/{frame_id}/image", get(gallery::frame_image))
        .route(
            "/api/v1/credential",
            get(credential::credential_status).put(credential::save_credential),
        )
        .route("/api/v1/jobs/analyze", post(jobs::submit_analyze))
        .route("/api/v1/jobs/images", post(jobs::submit_images))
        .route("/api/v1/jobs/video", post(jobs::submit_video))
        .route("/api/v1/jobs/{job_id}", get(jobs::job_status).delete(jobs::cancel_job))
        .route("/api/v1/jobs/{job_id}/keep/{index}", post(jobs::keep_generated_frame))
        .route("/api/v1/videos/{video_id}", get(videos::download_video))
        .with_state(state)
}

/// Error body returned by every handler: `{"error": ..., "category": ...}`.
#[derive(Debug)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub category: &'static str,
    pub message: String,
}

impl ApiFailure {
    pub fn new(status: StatusCode, category: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            category,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message, "category": self.category });
        (self.status, Json(body)).into_response()
    }
}

impl From<CredentialError> for ApiFailure {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidFormat => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_format", err.to_string())
            }
            CredentialError::Missing => {
                Self::new(StatusCode::UNAUTHORIZED, "missing_credential", err.to_string())
            }
            CredentialError::Storage(_) => {
                tracing::error!(error = %err, "Credential storage failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", err.to_string())
            }
        }
    }
}

impl From<CaptureError> for ApiFailure {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Blocked => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "capture_blocked", err.to_string())
            }
            CaptureError::NotReady => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "not_ready", err.to_string())
            }
            CaptureError::Encode(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "encode", err.to_string())
            }
        }
    }
}

impl From<JobSpecError> for ApiFailure {
    fn from(err: JobSpecError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_request", err.to_string())
    }
}
