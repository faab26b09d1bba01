use std::sync::Arc;

use tokio::sync::RwLock;

use crate::services::{
    backend::GenerativeBackend,
    credential::{CredentialHolder, KeySelectionFlag},
    gallery::Gallery,
    generation::{JobRunner, RunnerConfig},
    jobs::JobRegistry,
    video_store::VideoStore,
};

/// Shared application state passed to all route handlers.
///
/// The gallery and credential have exactly one owner (this struct); handlers
/// reach them through the locks.
#[derive(Clone)]
pub struct AppState {
    pub gallery: Arc<RwLock<Gallery>>,
    pub credential: Arc<RwLock<CredentialHolder>>,
    pub jobs: Arc<JobRegistry>,
    pub videos: Arc<VideoStore>,
    pub key_selection: Arc<KeySelectionFlag>,
    pub video_resolution: String,
}

impl AppState {
    pub fn new(
        credential: CredentialHolder,
        backend: Arc<dyn GenerativeBackend>,
        runner_config: RunnerConfig,
        video_resolution: &str,
    ) -> Self {
        let videos = Arc::new(VideoStore::new());
        let key_selection = Arc::new(KeySelectionFlag::default());
        let runner = JobRunner::new(backend, Arc::clone(&videos), runner_config)
            .with_key_selection(key_selection.clone());

        Self {
            gallery: Arc::new(RwLock::new(Gallery::new())),
            credential: Arc::new(RwLock::new(credential)),
            jobs: Arc::new(JobRegistry::new(Arc::new(runner))),
            videos,
            key_selection,
            video_resolution: video_resolution.to_string(),
        }
    }
}
