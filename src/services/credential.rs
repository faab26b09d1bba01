use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::services::generation::KeySelectionHook;

/// Prefix every Gemini API key carries.
pub const KEY_PREFIX: &str = "AIza";

/// File name the credential is persisted under.
pub const CREDENTIAL_FILE_NAME: &str = "api_key";

/// An API key. Its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Accepts any non-blank value, without format checks.
    pub fn new(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// Accepts only values that look like a vendor key.
    pub fn parse(value: &str) -> Result<Self, CredentialError> {
        let trimmed = value.trim();
        let well_formed = trimmed.starts_with(KEY_PREFIX)
            && trimmed.len() > KEY_PREFIX.len()
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(CredentialError::InvalidFormat);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CredentialSource {
    Override,
    Stored,
    Environment,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("API key must be a non-empty string starting with \"{}\"", KEY_PREFIX)]
    InvalidFormat,

    #[error("No API key configured. Save a key or set GEMINI_API_KEY.")]
    Missing,

    #[error("Failed to access persisted API key: {0}")]
    Storage(#[from] std::io::Error),
}

/// Process-wide optional API key, persisted to a single file.
pub struct CredentialHolder {
    path: PathBuf,
    stored: Option<ApiKey>,
    env_default: Option<ApiKey>,
}

impl CredentialHolder {
    /// Read the persisted key, if any. A missing file is not an error.
    pub fn load(path: impl Into<PathBuf>, env_default: Option<&str>) -> Result<Self, CredentialError> {
        let path = path.into();
        let stored = match std::fs::read_to_string(&path) {
            Ok(contents) => ApiKey::new(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(CredentialError::Storage(e)),
        };

        tracing::info!(
            path = %path.display(),
            stored = stored.is_some(),
            env_default = env_default.is_some(),
            "Loaded credential state"
        );

        Ok(Self {
            path,
            stored,
            env_default: env_default.and_then(ApiKey::new),
        })
    }

    /// Validate and persist a new key. On any failure, both the file and the
    /// in-memory value are left as they were.
    pub async fn save(&mut self, candidate: &str) -> Result<(), CredentialError> {
        let key = ApiKey::parse(candidate)?;
        write_atomically(&self.path, key.expose()).await?;
        self.stored = Some(key);
        tracing::info!(path = %self.path.display(), "Persisted new API key");
        Ok(())
    }

    /// Resolve the key for one call: override, then stored, then environment.
    pub fn effective_key(&self, override_key: Option<&str>) -> Result<ApiKey, CredentialError> {
        self.resolve(override_key)
            .map(|(key, _)| key)
            .ok_or(CredentialError::Missing)
    }

    /// Where the key for a call without an override would come from.
    pub fn source(&self) -> Option<CredentialSource> {
        self.resolve(None).map(|(_, source)| source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, override_key: Option<&str>) -> Option<(ApiKey, CredentialSource)> {
        if let Some(key) = override_key.and_then(ApiKey::new) {
            return Some((key, CredentialSource::Override));
        }
        if let Some(key) = &self.stored {
            return Some((key.clone(), CredentialSource::Stored));
        }
        self.env_default
            .clone()
            .map(|key| (key, CredentialSource::Environment))
    }
}

/// Raised when the generative API asks for a different key; cleared when a
/// new key is saved. Surfaced to clients so they can prompt for a key.
#[derive(Debug, Default)]
pub struct KeySelectionFlag {
    requested: AtomicBool,
}

impl KeySelectionFlag {
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

impl KeySelectionHook for KeySelectionFlag {
    fn request_key_selection(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }
}

async fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}
