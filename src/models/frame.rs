use std::fmt;
use std::io::Cursor;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::Display;
use uuid::Uuid;

/// Identifier of a gallery frame: creation time in milliseconds followed by a
/// random suffix. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(String);

impl FrameId {
    pub fn generate(created_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}-{}",
            created_at.timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FrameId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for FrameId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a frame came from. Generated frames did not come from the loaded
/// video and are tagged as such wherever they are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FrameOrigin {
    Captured,
    Generated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// An encoded raster image (JPEG, PNG, ...) held as base64 alongside its MIME
/// type. Serialized as a `data:` URL so it is self-describing on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    data: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageDataError {
    #[error("expected a base64 data URL (data:<mime>;base64,<payload>)")]
    NotDataUrl,

    #[error("invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl EncodedImage {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Wrap an already base64-encoded payload, as returned inline by the
    /// generative API.
    pub fn from_base64(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn base64_data(&self) -> &str {
        &self.data
    }

    pub fn decode(&self) -> Result<Vec<u8>, ImageDataError> {
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.data)?)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn parse_data_url(value: &str) -> Result<Self, ImageDataError> {
        let rest = value.strip_prefix("data:").ok_or(ImageDataError::NotDataUrl)?;
        let (mime_type, data) = rest
            .split_once(";base64,")
            .ok_or(ImageDataError::NotDataUrl)?;
        if mime_type.is_empty() {
            return Err(ImageDataError::NotDataUrl);
        }
        base64::engine::general_purpose::STANDARD.decode(data)?;
        Ok(Self::from_base64(mime_type, data))
    }

    /// Best-effort pixel dimensions read from the image header.
    pub fn dimensions(&self) -> Option<Dimensions> {
        let bytes = self.decode().ok()?;
        let (width, height) = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()?;
        Some(Dimensions { width, height })
    }
}

impl Serialize for EncodedImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for EncodedImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse_data_url(&value).map_err(serde::de::Error::custom)
    }
}

/// A still image in the gallery, captured from video or produced by a
/// generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub image_data: EncodedImage,
    /// Seconds into the source video. `None` for generated frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub origin: FrameOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

impl Frame {
    pub fn captured(image_data: EncodedImage, source_timestamp: f64, dimensions: Dimensions) -> Self {
        let created_at = Utc::now();
        Self {
            id: FrameId::generate(created_at),
            image_data,
            source_timestamp: Some(source_timestamp),
            created_at,
            origin: FrameOrigin::Captured,
            dimensions: Some(dimensions),
        }
    }

    pub fn generated(image_data: EncodedImage) -> Self {
        let created_at = Utc::now();
        let dimensions = image_data.dimensions();
        Self {
            id: FrameId::generate(created_at),
            image_data,
            source_timestamp: None,
            created_at,
            origin: FrameOrigin::Generated,
            dimensions,
        }
    }

    pub fn is_generated(&self) -> bool {
        self.origin == FrameOrigin::Generated
    }
}
