use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use crate::models::frame::EncodedImage;
use crate::models::job::{AspectRatio, VideoGenerateSpec};
use crate::services::backend::{ApiError, GenerativeBackend, VideoOperation};
use crate::services::credential::ApiKey;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const ANALYZE_INSTRUCTION: &str = concat!(
    "Analyze this video frame. Return JSON with two fields: ",
    "chineseDescription (a detailed description of the scene, subjects, lighting, ",
    "composition and style, written in Simplified Chinese) and ",
    "englishPrompt (a single English prompt that would let an image model ",
    "recreate this frame). Return ONLY valid JSON."
);

/// Model names used for each kind of request.
#[derive(Debug, Clone)]
pub struct GeminiModels {
    pub analyze: String,
    pub image: String,
    pub video: String,
}

/// Client for the Gemini / Veo REST API.
pub struct GeminiClient {
    http: Client,
    api_base: String,
    models: GeminiModels,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    response: Option<OperationResult>,
    error: Option<OperationError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResult {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl GeminiClient {
    pub fn new(api_base: &str, models: GeminiModels) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("clipforge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            models,
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, method)
    }

    async fn post_json(
        &self,
        key: &ApiKey,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<Response, ApiError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", key.expose())
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn generate_content(
        &self,
        key: &ApiKey,
        model: &str,
        body: serde_json::Value,
    ) -> Result<Vec<Part>, ApiError> {
        let url = self.model_url(model, "generateContent");
        let response: GenerateContentResponse =
            self.post_json(key, &url, &body).await?.json().await?;
        response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .ok_or_else(|| ApiError::Malformed("response contained no candidates".to_string()))
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn analyze_image(&self, key: &ApiKey, image: &EncodedImage) -> Result<String, ApiError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": image.mime_type(), "data": image.base64_data() } },
                    { "text": ANALYZE_INSTRUCTION }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "chineseDescription": { "type": "STRING" },
                        "englishPrompt": { "type": "STRING" }
                    },
                    "required": ["chineseDescription", "englishPrompt"]
                }
            }
        });

        let parts = self.generate_content(key, &self.models.analyze, body).await?;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        if text.is_empty() {
            return Err(ApiError::Malformed("analysis reply contained no text".to_string()));
        }
        Ok(text)
    }

    async fn generate_image(
        &self,
        key: &ApiKey,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<EncodedImage, ApiError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": aspect_ratio.as_str() }
            }
        });

        let parts = self.generate_content(key, &self.models.image, body).await?;
        parts
            .into_iter()
            .find_map(|p| p.inline_data)
            .map(|data| EncodedImage::from_base64(data.mime_type, data.data))
            .ok_or_else(|| ApiError::Malformed("image reply contained no inline image".to_string()))
    }

    async fn submit_video(
        &self,
        key: &ApiKey,
        request: &VideoGenerateSpec,
    ) -> Result<VideoOperation, ApiError> {
        let mut instance = json!({
            "prompt": request.prompt,
            "image": {
                "bytesBase64Encoded": request.start_image.base64_data(),
                "mimeType": request.start_image.mime_type()
            }
        });
        if let Some(end) = &request.end_image {
            instance["lastFrame"] = json!({
                "bytesBase64Encoded": end.base64_data(),
                "mimeType": end.mime_type()
            });
        }
        let body = json!({
            "instances": [instance],
            "parameters": {
                "aspectRatio": request.aspect_ratio.video_bucket().as_str(),
                "resolution": request.resolution
            }
        });

        let url = self.model_url(&self.models.video, "predictLongRunning");
        let operation: OperationResponse = self.post_json(key, &url, &body).await?.json().await?;
        operation.into_video_operation()
    }

    async fn poll_video(
        &self,
        key: &ApiKey,
        operation: &VideoOperation,
    ) -> Result<VideoOperation, ApiError> {
        let url = format!("{}/{}", self.api_base, operation.name);
        let response = self
            .http
            .get(&url)
            .header("x-goog-api-key", key.expose())
            .send()
            .await?;
        let operation: OperationResponse = check_status(response).await?.json().await?;
        operation.into_video_operation()
    }

    async fn fetch_video(&self, key: &ApiKey, uri: &str) -> Result<Vec<u8>, ApiError> {
        // The URL carries the key, so it is stripped from transport errors.
        let response = self
            .http
            .get(with_key_param(uri, key))
            .send()
            .await
            .map_err(|e| ApiError::Http(e.without_url()))?;
        let bytes = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(|e| ApiError::Http(e.without_url()))?;
        Ok(bytes.to_vec())
    }
}

impl OperationResponse {
    fn into_video_operation(self) -> Result<VideoOperation, ApiError> {
        if let Some(error) = self.error {
            return Err(ApiError::Status {
                status: error.code,
                message: error.message,
            });
        }
        let video_uri = self
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .and_then(|s| s.video)
            .and_then(|v| v.uri);
        Ok(VideoOperation {
            name: self.name,
            done: self.done,
            video_uri,
        })
    }
}

/// Append the API key as a `key` query parameter.
pub fn with_key_param(uri: &str, key: &ApiKey) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{}{}key={}", uri, separator, key.expose())
}

/// Turn a non-2xx response into [`ApiError::Status`], keeping the vendor's
/// error message when the body carries one.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => body.trim().to_string(),
    }
}
