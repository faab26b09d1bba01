use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::job::VideoResource;

pub const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Bytes of one fetched video.
#[derive(Debug, Clone)]
pub struct StoredVideo {
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
}

/// In-memory home for generated videos, the server-side counterpart of a
/// browser object URL. Nothing here outlives the process.
#[derive(Default)]
pub struct VideoStore {
    videos: RwLock<HashMap<Uuid, StoredVideo>>,
}

impl VideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bytes: Vec<u8>, mime_type: &str) -> VideoResource {
        let id = Uuid::new_v4();
        let resource = VideoResource {
            id,
            locator: locator_for(id),
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len(),
        };
        self.videos.write().await.insert(
            id,
            StoredVideo {
                mime_type: mime_type.to_string(),
                bytes: Arc::new(bytes),
            },
        );
        resource
    }

    pub async fn get(&self, id: Uuid) -> Option<StoredVideo> {
        self.videos.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.videos.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.videos.read().await.len()
    }
}

/// Opaque locator for a stored video, served at `/api/v1/videos/{id}`.
pub fn locator_for(id: Uuid) -> String {
    format!("blob:clipforge/{}", id)
}
