use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::services::credential::CREDENTIAL_FILE_NAME;
use crate::services::gemini::{GeminiModels, DEFAULT_API_BASE};
use crate::services::generation::{BatchPolicy, RunnerConfig};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the generative API
    #[serde(default = "default_api_base")]
    pub gemini_api_base: String,

    /// Fallback API key when none has been saved
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    /// Where the saved API key is persisted
    #[serde(default)]
    pub credential_path: Option<PathBuf>,

    #[serde(default = "default_analyze_model")]
    pub analyze_model: String,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    #[serde(default = "default_video_model")]
    pub video_model: String,

    #[serde(default = "default_video_resolution")]
    pub video_resolution: String,

    #[serde(default = "default_poll_interval_secs")]
    pub video_poll_interval_secs: u64,

    /// Bound on video polling; 0 disables the bound.
    #[serde(default = "default_max_wait_secs")]
    pub video_max_wait_secs: u64,

    #[serde(default)]
    pub image_batch_policy: BatchPolicy,

    /// Request body limit in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_analyze_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_video_model() -> String {
    "veo-3.1-fast-generate-preview".to_string()
}

fn default_video_resolution() -> String {
    "720p".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_wait_secs() -> u64 {
    900
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            poll_interval: Duration::from_secs(self.video_poll_interval_secs.max(1)),
            max_wait: (self.video_max_wait_secs > 0)
                .then(|| Duration::from_secs(self.video_max_wait_secs)),
            batch_policy: self.image_batch_policy,
        }
    }

    pub fn models(&self) -> GeminiModels {
        GeminiModels {
            analyze: self.analyze_model.clone(),
            image: self.image_model.clone(),
            video: self.video_model.clone(),
        }
    }

    /// Configured credential path, else `<config dir>/clipforge/api_key`.
    pub fn credential_path(&self) -> PathBuf {
        self.credential_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("clipforge")
                .join(CREDENTIAL_FILE_NAME)
        })
    }
}
