use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub credential: ComponentHealth,
    pub active_jobs: usize,
    pub gallery_frames: usize,
    pub stored_videos: usize,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub detail: Option<String>,
}

/// GET /health: liveness plus local state summary.
///
/// A missing credential is reported as "degraded": the service still serves
/// the gallery but cannot start generation jobs.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let credential = match state.credential.read().await.source() {
        Some(source) => ComponentHealth {
            status: "ok".to_string(),
            detail: Some(source.to_string()),
        },
        None => ComponentHealth {
            status: "missing".to_string(),
            detail: None,
        },
    };

    let status = if credential.status == "ok" && !state.key_selection.is_requested() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            credential,
            active_jobs: state.jobs.active_count().await,
            gallery_frames: state.gallery.read().await.len(),
            stored_videos: state.videos.len().await,
        },
    })
}
