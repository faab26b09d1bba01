//! Drives one generation job to a terminal state.
//!
//! Every remote error is caught here and classified into a
//! [`GenerationFailure`]; nothing escapes past [`JobRunner::execute`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::models::frame::Frame;
use crate::models::job::{
    AnalysisResult, AnalyzeSpec, GenerationFailure, GenerationJob, ImageGenerateSpec, JobOutput,
    JobSpec, ParseDegradeWarning, VideoGenerateSpec, ANALYSIS_PLACEHOLDER,
};
use crate::services::backend::{ApiError, GenerativeBackend};
use crate::services::credential::ApiKey;
use crate::services::video_store::{VideoStore, VIDEO_MIME_TYPE};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// What an image batch does when some of its sub-requests fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Any failed sub-request fails the whole job.
    #[default]
    AllOrNothing,
    /// The job succeeds with whatever images came back, as long as one did.
    PartialSuccess,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    /// Upper bound on video polling. `None` polls until done or cancelled.
    pub max_wait: Option<Duration>,
    pub batch_policy: BatchPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            batch_policy: BatchPolicy::AllOrNothing,
        }
    }
}

/// Host affordance for picking a different (paid-tier) key, invoked before a
/// billing failure is surfaced.
pub trait KeySelectionHook: Send + Sync {
    fn request_key_selection(&self);
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisPayload {
    chinese_description: String,
    english_prompt: String,
}

pub struct JobRunner {
    backend: Arc<dyn GenerativeBackend>,
    videos: Arc<VideoStore>,
    key_selection: Option<Arc<dyn KeySelectionHook>>,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        videos: Arc<VideoStore>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            backend,
            videos,
            key_selection: None,
            config,
        }
    }

    pub fn with_key_selection(mut self, hook: Arc<dyn KeySelectionHook>) -> Self {
        self.key_selection = Some(hook);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Store that finished video jobs write into.
    pub fn videos(&self) -> &Arc<VideoStore> {
        &self.videos
    }

    /// Run `job` from `Idle` to `Succeeded` or `Failed`.
    pub async fn run(&self, job: &mut GenerationJob, key: &ApiKey, cancel: &CancellationToken) {
        if let Err(e) = job.start() {
            tracing::warn!(job_id = %job.id, error = %e, "Refusing to run job");
            return;
        }
        let outcome = self.execute(&job.spec, key, cancel).await;
        if let Err(e) = job.finish(outcome) {
            tracing::error!(job_id = %job.id, error = %e, "Job finished in unexpected state");
        }
    }

    /// Perform the remote work for `spec`, returning the classified outcome.
    pub async fn execute(
        &self,
        spec: &JobSpec,
        key: &ApiKey,
        cancel: &CancellationToken,
    ) -> Result<JobOutput, GenerationFailure> {
        let work = async {
            match spec {
                JobSpec::Analyze(analyze) => self.analyze(analyze, key).await,
                JobSpec::ImageGenerate(images) => self.generate_images(images, key).await,
                JobSpec::VideoGenerate(video) => self.generate_video(video, key, cancel).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GenerationFailure::Cancelled),
            outcome = work => outcome,
        }
    }

    async fn analyze(&self, spec: &AnalyzeSpec, key: &ApiKey) -> Result<JobOutput, GenerationFailure> {
        let raw = self
            .backend
            .analyze_image(key, &spec.image)
            .await
            .map_err(|e| self.classify(&e))?;

        let result = parse_analysis(&raw);
        if let Some(warning) = &result.warning {
            tracing::warn!(reason = %warning.reason, "Analysis reply was not structured, using raw text");
        }
        Ok(JobOutput::Analysis(result))
    }

    async fn generate_images(
        &self,
        spec: &ImageGenerateSpec,
        key: &ApiKey,
    ) -> Result<JobOutput, GenerationFailure> {
        let requests = (0..spec.count)
            .map(|_| self.backend.generate_image(key, &spec.prompt, spec.aspect_ratio));
        let results = join_all(requests).await;

        let mut frames = Vec::new();
        let mut errors = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(image) => frames.push(Frame::generated(image)),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Image sub-request failed");
                    errors.push(e);
                }
            }
        }

        let first_error = match errors.first() {
            None => {
                return Ok(JobOutput::Images {
                    frames,
                    failures: Vec::new(),
                })
            }
            Some(e) => e,
        };

        match self.config.batch_policy {
            BatchPolicy::PartialSuccess if !frames.is_empty() => Ok(JobOutput::Images {
                frames,
                failures: errors.iter().map(|e| e.vendor_message()).collect(),
            }),
            _ => Err(self.classify(first_error)),
        }
    }

    async fn generate_video(
        &self,
        spec: &VideoGenerateSpec,
        key: &ApiKey,
        cancel: &CancellationToken,
    ) -> Result<JobOutput, GenerationFailure> {
        let started = Instant::now();
        let mut operation = self
            .backend
            .submit_video(key, spec)
            .await
            .map_err(|e| self.classify(&e))?;

        tracing::info!(operation = %operation.name, "Video generation submitted");

        let mut attempt = 0u32;
        while !operation.done {
            if cancel.is_cancelled() {
                return Err(GenerationFailure::Cancelled);
            }
            // Never sleep past the polling bound.
            let mut wait = self.config.poll_interval;
            if let Some(max_wait) = self.config.max_wait {
                let elapsed = started.elapsed();
                if elapsed >= max_wait {
                    return Err(GenerationFailure::TimedOut {
                        waited_secs: elapsed.as_secs(),
                    });
                }
                wait = wait.min(max_wait - elapsed);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(GenerationFailure::Cancelled),
                _ = sleep(wait) => {}
            }

            attempt += 1;
            metrics::counter!("video_polls_total").increment(1);
            tracing::debug!(operation = %operation.name, attempt, "Polling video operation");

            operation = self
                .backend
                .poll_video(key, &operation)
                .await
                .map_err(|e| self.classify(&e))?;
        }

        let uri = operation.video_uri.ok_or_else(|| GenerationFailure::Generation {
            message: "Video generation finished without returning a video".to_string(),
        })?;

        let bytes = self
            .backend
            .fetch_video(key, &uri)
            .await
            .map_err(|e| self.classify(&e))?;

        let resource = self.videos.insert(bytes, VIDEO_MIME_TYPE).await;
        tracing::info!(
            attempts = attempt,
            size_bytes = resource.size_bytes,
            elapsed_secs = started.elapsed().as_secs(),
            "Video generation complete"
        );
        Ok(JobOutput::Video(resource))
    }

    /// Classify a remote error, invoking the key-selection hook for billing
    /// rejections.
    fn classify(&self, err: &ApiError) -> GenerationFailure {
        let failure = classify(err);
        if let GenerationFailure::BillingRequired { detail } = &failure {
            tracing::warn!(detail = %detail, "Generative API rejected the key (billing required)");
            if let Some(hook) = &self.key_selection {
                hook.request_key_selection();
            }
        }
        failure
    }
}

/// HTTP 403, by status code or anywhere in the message, means billing is
/// required. Everything else passes through with the vendor's message.
pub fn classify(err: &ApiError) -> GenerationFailure {
    let message = err.vendor_message();
    if err.status_code() == Some(403) || message.contains("403") || err.to_string().contains("403") {
        GenerationFailure::BillingRequired { detail: message }
    } else {
        GenerationFailure::Generation { message }
    }
}

/// Parse an analysis reply, degrading to the raw text when it is not the
/// expected JSON object.
pub fn parse_analysis(raw: &str) -> AnalysisResult {
    match serde_json::from_str::<AnalysisPayload>(raw.trim()) {
        Ok(payload) => AnalysisResult {
            chinese_description: payload.chinese_description,
            english_prompt: payload.english_prompt,
            warning: None,
        },
        Err(e) => AnalysisResult {
            chinese_description: ANALYSIS_PLACEHOLDER.to_string(),
            english_prompt: raw.to_string(),
            warning: Some(ParseDegradeWarning {
                reason: e.to_string(),
            }),
        },
    }
}
