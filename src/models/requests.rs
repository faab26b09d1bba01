use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::frame::{Dimensions, Frame, FrameId, FrameOrigin};
use crate::models::job::{AspectRatio, GenerationJob, JobKind, JobOutput, JobStatus};
use crate::services::credential::CredentialSource;

/// Gallery entry without its image payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct FrameSummary {
    pub id: FrameId,
    pub origin: FrameOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    pub mime_type: String,
    pub image_url: String,
}

impl From<&Frame> for FrameSummary {
    fn from(frame: &Frame) -> Self {
        Self {
            id: frame.id.clone(),
            origin: frame.origin,
            source_timestamp: frame.source_timestamp,
            created_at: frame.created_at,
            dimensions: frame.dimensions,
            mime_type: frame.image_data.mime_type().to_string(),
            image_url: format!("/api/v1/gallery/{}/image", frame.id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GalleryResponse {
    pub frames: Vec<FrameSummary>,
    pub selected_id: Option<FrameId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectionResponse {
    pub selected_id: Option<FrameId>,
}

#[derive(Debug, Deserialize)]
pub struct SaveCredentialRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub configured: bool,
    pub source: Option<CredentialSource>,
    pub key_selection_requested: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub frame_id: FrameId,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateImagesRequest {
    pub prompt: String,
    #[serde(default = "default_image_aspect")]
    pub aspect_ratio: AspectRatio,
    #[serde(default = "default_image_count")]
    pub count: u8,
    pub api_key: Option<String>,
}

fn default_image_aspect() -> AspectRatio {
    AspectRatio::Square
}

fn default_image_count() -> u8 {
    1
}

#[derive(Debug, Deserialize)]
pub struct GenerateVideoRequest {
    /// Defaults to the selected frame.
    pub start_frame_id: Option<FrameId>,
    pub end_frame_id: Option<FrameId>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_video_aspect")]
    pub aspect_ratio: AspectRatio,
    pub api_key: Option<String>,
}

fn default_video_aspect() -> AspectRatio {
    AspectRatio::Landscape
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobErrorView {
    pub category: String,
    pub message: String,
}

/// Job status as reported to clients.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorView>,
}

impl From<&GenerationJob> for JobView {
    fn from(job: &GenerationJob) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind(),
            status: job.status(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            result: job.result().cloned(),
            error: job.error().map(|failure| JobErrorView {
                category: failure.category().to_string(),
                message: failure.to_string(),
            }),
        }
    }
}
