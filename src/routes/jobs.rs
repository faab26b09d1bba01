use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::frame::FrameId;
use crate::models::job::{JobOutput, JobSpec};
use crate::models::requests::{
    AnalyzeRequest, FrameSummary, GenerateImagesRequest, GenerateVideoRequest, JobView,
};
use crate::routes::ApiFailure;
use crate::services::credential::ApiKey;

/// Resolve the key before any job exists, so a missing key costs no remote call.
async fn resolve_key(state: &AppState, override_key: Option<&str>) -> Result<ApiKey, ApiFailure> {
    Ok(state.credential.read().await.effective_key(override_key)?)
}

async fn submit(state: &AppState, spec: JobSpec, key: ApiKey) -> (StatusCode, Json<JobView>) {
    let job = state.jobs.submit(spec, key).await;
    (StatusCode::ACCEPTED, Json(JobView::from(&job)))
}

/// POST /api/v1/jobs/analyze: Describe a gallery frame and derive a prompt.
pub async fn submit_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<JobView>), ApiFailure> {
    let key = resolve_key(&state, request.api_key.as_deref()).await?;
    let image = {
        let gallery = state.gallery.read().await;
        gallery
            .get(&request.frame_id)
            .map(|f| f.image_data.clone())
            .ok_or_else(|| ApiFailure::not_found("frame not found"))?
    };

    let spec = JobSpec::analyze(image, Some(request.frame_id));
    Ok(submit(&state, spec, key).await)
}

/// POST /api/v1/jobs/images: Generate 1 to 3 images from a prompt.
pub async fn submit_images(
    State(state): State<AppState>,
    Json(request): Json<GenerateImagesRequest>,
) -> Result<(StatusCode, Json<JobView>), ApiFailure> {
    let key = resolve_key(&state, request.api_key.as_deref()).await?;
    let spec = JobSpec::image_generate(&request.prompt, request.aspect_ratio, request.count)?;
    Ok(submit(&state, spec, key).await)
}

/// POST /api/v1/jobs/video: Animate from a start frame (selected frame by
/// default) to an optional end frame.
pub async fn submit_video(
    State(state): State<AppState>,
    Json(request): Json<GenerateVideoRequest>,
) -> Result<(StatusCode, Json<JobView>), ApiFailure> {
    let key = resolve_key(&state, request.api_key.as_deref()).await?;

    let (start_image, end_image) = {
        let gallery = state.gallery.read().await;
        let start = match &request.start_frame_id {
            Some(id) => gallery.get(id),
            None => gallery.selected(),
        }
        .ok_or_else(|| {
            ApiFailure::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "missing_start_frame",
                "a start frame is required for video generation",
            )
        })?;
        let end = match &request.end_frame_id {
            Some(id) => Some(
                gallery
                    .get(id)
                    .ok_or_else(|| ApiFailure::not_found("end frame not found"))?,
            ),
            None => None,
        };
        (
            start.image_data.clone(),
            end.map(|f| f.image_data.clone()),
        )
    };

    let spec = JobSpec::video_generate(
        start_image,
        end_image,
        &request.prompt,
        request.aspect_ratio,
        &state.video_resolution,
    )?;
    Ok(submit(&state, spec, key).await)
}

/// GET /api/v1/jobs/{job_id}
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobView>, ApiFailure> {
    let job = state
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| ApiFailure::not_found("job not found"))?;
    Ok(Json(JobView::from(&job)))
}

/// DELETE /api/v1/jobs/{job_id}: Request cancellation.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, ApiFailure> {
    if state.jobs.cancel(job_id).await {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiFailure::not_found("job not found"))
    }
}

/// POST /api/v1/jobs/{job_id}/keep/{index}: Import one generated image into
/// the gallery. Nothing is imported automatically.
pub async fn keep_generated_frame(
    State(state): State<AppState>,
    Path((job_id, index)): Path<(Uuid, usize)>,
) -> Result<(StatusCode, Json<FrameSummary>), ApiFailure> {
    let job = state
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| ApiFailure::not_found("job not found"))?;

    let frame = match job.result() {
        Some(JobOutput::Images { frames, .. }) => frames
            .get(index)
            .cloned()
            .ok_or_else(|| ApiFailure::not_found("no generated image at that index"))?,
        _ => {
            return Err(ApiFailure::new(
                StatusCode::CONFLICT,
                "no_images",
                "job has no generated images to keep",
            ))
        }
    };

    let mut gallery = state.gallery.write().await;
    if gallery.has_used(&frame.id) {
        return Err(ApiFailure::new(
            StatusCode::CONFLICT,
            "already_kept",
            "this image has already been kept",
        ));
    }
    let summary = FrameSummary::from(&frame);
    let frame_id: FrameId = frame.id.clone();
    gallery.import_generated(frame);
    metrics::gauge!("gallery_frames").set(gallery.len() as f64);
    tracing::info!(job_id = %job_id, frame_id = %frame_id, "Kept generated frame");

    Ok((StatusCode::CREATED, Json(summary)))
}
