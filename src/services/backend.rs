use async_trait::async_trait;

use crate::models::frame::EncodedImage;
use crate::models::job::{AspectRatio, VideoGenerateSpec};
use crate::services::credential::ApiKey;

/// Handle to a long-running video generation on the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOperation {
    pub name: String,
    pub done: bool,
    /// Set once `done` and the operation produced a video.
    pub video_uri: Option<String>,
}

/// Error from a call into the generative service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generative API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Malformed API response: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Malformed(_) => None,
        }
    }

    /// The vendor-provided message when there is one.
    pub fn vendor_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// The remote generative service.
///
/// Every method is one network round trip; none of them retry.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Describe an image. Returns the raw reply text, expected (but not
    /// guaranteed) to be a JSON object with `chineseDescription` and
    /// `englishPrompt`.
    async fn analyze_image(&self, key: &ApiKey, image: &EncodedImage) -> Result<String, ApiError>;

    async fn generate_image(
        &self,
        key: &ApiKey,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<EncodedImage, ApiError>;

    async fn submit_video(
        &self,
        key: &ApiKey,
        request: &VideoGenerateSpec,
    ) -> Result<VideoOperation, ApiError>;

    async fn poll_video(
        &self,
        key: &ApiKey,
        operation: &VideoOperation,
    ) -> Result<VideoOperation, ApiError>;

    /// Download the finished video. The key travels as a `key` query
    /// parameter on `uri`.
    async fn fetch_video(&self, key: &ApiKey, uri: &str) -> Result<Vec<u8>, ApiError>;
}
