//! Test helper utilities: a scripted generative backend and a counting
//! key-selection hook.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipforge::models::frame::EncodedImage;
use clipforge::models::job::{AspectRatio, VideoGenerateSpec};
use clipforge::services::backend::{ApiError, GenerativeBackend, VideoOperation};
use clipforge::services::credential::ApiKey;
use clipforge::services::generation::{BatchPolicy, JobRunner, KeySelectionHook, RunnerConfig};
use clipforge::services::video_store::VideoStore;

type Script<T> = Mutex<VecDeque<Result<T, ApiError>>>;

/// Backend that replays queued replies in order. An exhausted queue answers
/// with a malformed-response error, except video polls when
/// `keep_pending` is set.
#[derive(Default)]
pub struct ScriptedBackend {
    analysis: Script<String>,
    images: Script<EncodedImage>,
    submissions: Script<VideoOperation>,
    polls: Script<VideoOperation>,
    videos: Script<Vec<u8>>,
    keep_pending: bool,
    pub analyze_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub fetched_uris: Mutex<Vec<String>>,
    pub submitted_aspects: Mutex<Vec<AspectRatio>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analysis(self, reply: Result<String, ApiError>) -> Self {
        self.analysis.lock().unwrap().push_back(reply);
        self
    }

    pub fn image(self, reply: Result<EncodedImage, ApiError>) -> Self {
        self.images.lock().unwrap().push_back(reply);
        self
    }

    pub fn submission(self, reply: Result<VideoOperation, ApiError>) -> Self {
        self.submissions.lock().unwrap().push_back(reply);
        self
    }

    pub fn poll(self, reply: Result<VideoOperation, ApiError>) -> Self {
        self.polls.lock().unwrap().push_back(reply);
        self
    }

    pub fn video(self, reply: Result<Vec<u8>, ApiError>) -> Self {
        self.videos.lock().unwrap().push_back(reply);
        self
    }

    pub fn keep_pending(mut self) -> Self {
        self.keep_pending = true;
        self
    }

    fn next<T>(script: &Script<T>, call: &str) -> Result<T, ApiError> {
        script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Malformed(format!("unscripted {} call", call))))
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn analyze_image(&self, _key: &ApiKey, _image: &EncodedImage) -> Result<String, ApiError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.analysis, "analyze")
    }

    async fn generate_image(
        &self,
        _key: &ApiKey,
        _prompt: &str,
        _aspect_ratio: AspectRatio,
    ) -> Result<EncodedImage, ApiError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.images, "image")
    }

    async fn submit_video(
        &self,
        _key: &ApiKey,
        request: &VideoGenerateSpec,
    ) -> Result<VideoOperation, ApiError> {
        self.submitted_aspects.lock().unwrap().push(request.aspect_ratio);
        Self::next(&self.submissions, "submit")
    }

    async fn poll_video(
        &self,
        _key: &ApiKey,
        operation: &VideoOperation,
    ) -> Result<VideoOperation, ApiError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let mut polls = self.polls.lock().unwrap();
        match polls.pop_front() {
            Some(reply) => reply,
            None if self.keep_pending => Ok(operation.clone()),
            None => Err(ApiError::Malformed("unscripted poll call".to_string())),
        }
    }

    async fn fetch_video(&self, key: &ApiKey, uri: &str) -> Result<Vec<u8>, ApiError> {
        self.fetched_uris
            .lock()
            .unwrap()
            .push(clipforge::services::gemini::with_key_param(uri, key));
        Self::next(&self.videos, "fetch")
    }
}

#[derive(Default)]
pub struct CountingHook {
    pub calls: AtomicUsize,
}

impl KeySelectionHook for CountingHook {
    fn request_key_selection(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn pending(name: &str) -> VideoOperation {
    VideoOperation {
        name: name.to_string(),
        done: false,
        video_uri: None,
    }
}

pub fn finished(name: &str, uri: &str) -> VideoOperation {
    VideoOperation {
        name: name.to_string(),
        done: true,
        video_uri: Some(uri.to_string()),
    }
}

pub fn status_error(status: u16, message: &str) -> ApiError {
    ApiError::Status {
        status,
        message: message.to_string(),
    }
}

pub fn test_key() -> ApiKey {
    ApiKey::parse("AIzaTestKey_0123456789").unwrap()
}

pub fn runner_config(batch_policy: BatchPolicy) -> RunnerConfig {
    RunnerConfig {
        poll_interval: Duration::from_secs(5),
        max_wait: None,
        batch_policy,
    }
}

pub fn runner(backend: Arc<ScriptedBackend>, config: RunnerConfig) -> (JobRunner, Arc<VideoStore>) {
    let videos = Arc::new(VideoStore::new());
    (JobRunner::new(backend, Arc::clone(&videos), config), videos)
}
