use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::frame::{EncodedImage, Frame, FrameId};

/// Chinese-slot placeholder used when an analysis reply is not valid JSON.
pub const ANALYSIS_PLACEHOLDER: &str = "解析失败，请直接使用英文提示词";

/// User-facing remediation for authorization/billing rejections.
pub const BILLING_REQUIRED_MESSAGE: &str =
    "This model requires an API key from a project with billing enabled (paid tier). Select a paid-tier key and try again.";

/// Aspect ratios offered for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    #[strum(serialize = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    #[strum(serialize = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    #[strum(serialize = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    #[strum(serialize = "3:4")]
    StandardPortrait,
    #[serde(rename = "1:1")]
    #[strum(serialize = "1:1")]
    Square,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Standard,
        AspectRatio::StandardPortrait,
        AspectRatio::Square,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Standard => "4:3",
            AspectRatio::StandardPortrait => "3:4",
            AspectRatio::Square => "1:1",
        }
    }

    /// Collapse to one of the two ratios the video model accepts.
    pub fn video_bucket(self) -> AspectRatio {
        match self {
            AspectRatio::Portrait | AspectRatio::StandardPortrait => AspectRatio::Portrait,
            _ => AspectRatio::Landscape,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    Analyze,
    ImageGenerate,
    VideoGenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Validate)]
pub struct AnalyzeSpec {
    #[garde(skip)]
    pub image: EncodedImage,
    #[garde(skip)]
    pub source_frame: Option<FrameId>,
}

#[derive(Debug, Clone, Validate)]
pub struct ImageGenerateSpec {
    #[garde(length(min = 1, max = 4000))]
    pub prompt: String,
    #[garde(skip)]
    pub aspect_ratio: AspectRatio,
    #[garde(range(min = 1, max = 3))]
    pub count: u8,
}

#[derive(Debug, Clone, Validate)]
pub struct VideoGenerateSpec {
    #[garde(skip)]
    pub start_image: EncodedImage,
    #[garde(skip)]
    pub end_image: Option<EncodedImage>,
    #[garde(length(max = 4000))]
    pub prompt: String,
    /// Always one of the two video buckets.
    #[garde(skip)]
    pub aspect_ratio: AspectRatio,
    #[garde(length(min = 1, max = 16))]
    pub resolution: String,
}

/// Closed, validated configuration for one generation job.
#[derive(Debug, Clone)]
pub enum JobSpec {
    Analyze(AnalyzeSpec),
    ImageGenerate(ImageGenerateSpec),
    VideoGenerate(VideoGenerateSpec),
}

#[derive(Debug, thiserror::Error)]
pub enum JobSpecError {
    #[error("invalid job configuration: {0}")]
    Invalid(String),
}

impl From<garde::Report> for JobSpecError {
    fn from(report: garde::Report) -> Self {
        JobSpecError::Invalid(report.to_string())
    }
}

impl JobSpec {
    pub fn analyze(image: EncodedImage, source_frame: Option<FrameId>) -> Self {
        JobSpec::Analyze(AnalyzeSpec {
            image,
            source_frame,
        })
    }

    pub fn image_generate(
        prompt: &str,
        aspect_ratio: AspectRatio,
        count: u8,
    ) -> Result<Self, JobSpecError> {
        let spec = ImageGenerateSpec {
            prompt: prompt.trim().to_string(),
            aspect_ratio,
            count,
        };
        spec.validate()?;
        Ok(JobSpec::ImageGenerate(spec))
    }

    pub fn video_generate(
        start_image: EncodedImage,
        end_image: Option<EncodedImage>,
        prompt: &str,
        aspect_ratio: AspectRatio,
        resolution: &str,
    ) -> Result<Self, JobSpecError> {
        let spec = VideoGenerateSpec {
            start_image,
            end_image,
            prompt: prompt.trim().to_string(),
            aspect_ratio: aspect_ratio.video_bucket(),
            resolution: resolution.to_string(),
        };
        spec.validate()?;
        Ok(JobSpec::VideoGenerate(spec))
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobSpec::Analyze(_) => JobKind::Analyze,
            JobSpec::ImageGenerate(_) => JobKind::ImageGenerate,
            JobSpec::VideoGenerate(_) => JobKind::VideoGenerate,
        }
    }
}

/// Soft warning: the analysis reply was not structured, so the raw text was
/// used as the English prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseDegradeWarning {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub chinese_description: String,
    pub english_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub warning: Option<ParseDegradeWarning>,
}

/// A generated video held in the local video store, addressed by `locator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResource {
    pub id: Uuid,
    pub locator: String,
    pub mime_type: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutput {
    Analysis(AnalysisResult),
    Images {
        frames: Vec<Frame>,
        /// Sub-request failures tolerated under the partial-success policy.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        failures: Vec<String>,
    },
    Video(VideoResource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureCategory {
    BillingRequired,
    Generation,
    Cancelled,
    TimedOut,
}

/// Classified terminal failure of a generation job.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationFailure {
    #[error("{}", BILLING_REQUIRED_MESSAGE)]
    BillingRequired { detail: String },

    #[error("{message}")]
    Generation { message: String },

    #[error("generation was cancelled")]
    Cancelled,

    #[error("video generation did not finish within {waited_secs} seconds")]
    TimedOut { waited_secs: u64 },
}

impl GenerationFailure {
    pub fn category(&self) -> FailureCategory {
        match self {
            GenerationFailure::BillingRequired { .. } => FailureCategory::BillingRequired,
            GenerationFailure::Generation { .. } => FailureCategory::Generation,
            GenerationFailure::Cancelled => FailureCategory::Cancelled,
            GenerationFailure::TimedOut { .. } => FailureCategory::TimedOut,
        }
    }
}

#[derive(Debug, Clone)]
pub enum JobState {
    Idle,
    Running,
    Succeeded(JobOutput),
    Failed(GenerationFailure),
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Idle => JobStatus::Idle,
            JobState::Running => JobStatus::Running,
            JobState::Succeeded(_) => JobStatus::Succeeded,
            JobState::Failed(_) => JobStatus::Failed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("job cannot move from {from} to {to}")]
pub struct JobTransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One request/response cycle against the generative service.
///
/// Progresses `Idle -> Running -> Succeeded | Failed` and never goes back;
/// a retry is a new job.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: Uuid,
    pub spec: JobSpec,
    state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            spec,
            state: JobState::Idle,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.spec.kind()
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn result(&self) -> Option<&JobOutput> {
        match &self.state {
            JobState::Succeeded(output) => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&GenerationFailure> {
        match &self.state {
            JobState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Succeeded(_) | JobState::Failed(_))
    }

    pub fn start(&mut self) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Idle, JobState::Running)
    }

    pub fn succeed(&mut self, output: JobOutput) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Running, JobState::Succeeded(output))
    }

    pub fn fail(&mut self, failure: GenerationFailure) -> Result<(), JobTransitionError> {
        self.transition(JobStatus::Running, JobState::Failed(failure))
    }

    pub fn finish(
        &mut self,
        outcome: Result<JobOutput, GenerationFailure>,
    ) -> Result<(), JobTransitionError> {
        match outcome {
            Ok(output) => self.succeed(output),
            Err(failure) => self.fail(failure),
        }
    }

    fn transition(&mut self, expected: JobStatus, next: JobState) -> Result<(), JobTransitionError> {
        let from = self.status();
        if from != expected {
            return Err(JobTransitionError {
                from,
                to: next.status(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
