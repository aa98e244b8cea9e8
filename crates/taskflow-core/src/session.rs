use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::profile::ViewProfile;
use crate::wizard::{Prompt, Scratch};

pub const PROMPT_TTL: Duration = Duration::from_secs(300);
pub const SCRATCH_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to persist {path}: {message}")]
    Persist { path: PathBuf, message: String },
}

/// String key/value storage with optional per-key expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        let expired = entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl FileEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// JSON snapshot on disk, rewritten atomically after every change.
#[derive(Debug)]
pub struct FileStore {
    pub path: PathBuf,
    entries: Mutex<HashMap<String, FileEntry>>,
}

impl FileStore {
    #[tracing::instrument(skip(path))]
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let mut entries: HashMap<String, FileEntry> = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };

        let before = entries.len();
        let now = Utc::now();
        entries.retain(|_, e| !e.is_expired(now));

        info!(
            file = %path.display(),
            loaded = before,
            live = entries.len(),
            "opened session file"
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Serializes under the caller's lock; the disk write runs on the blocking pool.
    async fn save(&self, entries: &HashMap<String, FileEntry>) -> Result<(), StoreError> {
        debug!(file = %self.path.display(), count = entries.len(), "saving session snapshot");
        let bytes = serde_json::to_vec(entries)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_snapshot(&path, &bytes))
            .await
            .map_err(|err| StoreError::Persist {
                path: self.path.clone(),
                message: err.to_string(),
            })?
    }
}

fn write_snapshot(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(path).map_err(|err| StoreError::Persist {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    Ok(())
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.is_expired(Utc::now())) {
            entries.remove(key);
            self.save(&entries).await?;
            return Ok(None);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl
            .and_then(|t| chrono::Duration::from_std(t).ok())
            .map(|t| Utc::now() + t);
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            FileEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        self.save(&entries).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}

pub mod keys {
    pub fn state(user_id: i64) -> String {
        format!("user:{user_id}:state")
    }

    pub fn access_token(user_id: i64) -> String {
        format!("user:{user_id}:access_token")
    }

    pub fn refresh_token(user_id: i64) -> String {
        format!("user:{user_id}:refresh_token")
    }

    pub fn profile(user_id: i64) -> String {
        format!("user:{user_id}:profile")
    }

    pub fn prompt(user_id: i64) -> String {
        format!("user:{user_id}:prompt")
    }

    pub fn scratch(user_id: i64) -> String {
        format!("user:{user_id}:scratch")
    }
}

/// Long-lived account state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    Started,
    LoggedIn,
    LoggedOut,
}

impl UserState {
    pub fn as_str(self) -> &'static str {
        match self {
            UserState::Started => "started",
            UserState::LoggedIn => "logged_in",
            UserState::LoggedOut => "logged_out",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "started" => Some(UserState::Started),
            "logged_in" => Some(UserState::LoggedIn),
            "logged_out" => Some(UserState::LoggedOut),
            _ => None,
        }
    }
}

impl fmt::Display for UserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user view of the store, handed to every handler.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
    pub user_id: i64,
    page_size: usize,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("user_id", &self.user_id).finish()
    }
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>, user_id: i64, page_size: usize) -> Self {
        Self {
            store,
            user_id,
            page_size,
        }
    }

    pub async fn state(&self) -> Result<Option<UserState>, StoreError> {
        let raw = self.store.get(&keys::state(self.user_id)).await?;
        Ok(raw.as_deref().and_then(UserState::parse))
    }

    pub async fn set_state(&self, state: UserState) -> Result<(), StoreError> {
        self.store
            .set(&keys::state(self.user_id), state.as_str(), None)
            .await
    }

    pub async fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.store.get(&keys::access_token(self.user_id)).await
    }

    pub async fn is_authenticated(&self) -> Result<bool, StoreError> {
        Ok(self.access_token().await?.is_some_and(|t| !t.is_empty()))
    }

    pub async fn set_tokens(&self, access: &str, refresh: &str) -> Result<(), StoreError> {
        self.store
            .set(&keys::access_token(self.user_id), access, None)
            .await?;
        self.store
            .set(&keys::refresh_token(self.user_id), refresh, None)
            .await
    }

    pub async fn clear_tokens(&self) -> Result<(), StoreError> {
        self.store.delete(&keys::access_token(self.user_id)).await?;
        self.store.delete(&keys::refresh_token(self.user_id)).await
    }

    /// Stored profile, or a fresh default when none is stored or it no longer decodes.
    pub async fn profile(&self) -> Result<ViewProfile, StoreError> {
        let raw = self.store.get(&keys::profile(self.user_id)).await?;
        let Some(raw) = raw else {
            return Ok(ViewProfile::with_page_size(self.page_size));
        };
        match serde_json::from_str::<ViewProfile>(&raw) {
            Ok(mut profile) => {
                profile.page_size = self.page_size;
                Ok(profile)
            }
            Err(err) => {
                warn!(user_id = self.user_id, error = %err, "discarding undecodable profile");
                Ok(ViewProfile::with_page_size(self.page_size))
            }
        }
    }

    pub async fn save_profile(&self, profile: &ViewProfile) -> Result<(), StoreError> {
        let raw = serde_json::to_string(profile)?;
        self.store.set(&keys::profile(self.user_id), &raw, None).await
    }

    pub async fn clear_profile(&self) -> Result<(), StoreError> {
        self.store.delete(&keys::profile(self.user_id)).await
    }

    pub async fn prompt(&self) -> Result<Option<Prompt>, StoreError> {
        let raw = self.store.get(&keys::prompt(self.user_id)).await?;
        Ok(raw.and_then(|r| serde_json::from_str(&r).ok()))
    }

    pub async fn set_prompt(&self, prompt: &Prompt) -> Result<(), StoreError> {
        let raw = serde_json::to_string(prompt)?;
        self.store
            .set(&keys::prompt(self.user_id), &raw, Some(PROMPT_TTL))
            .await
    }

    pub async fn clear_prompt(&self) -> Result<(), StoreError> {
        self.store.delete(&keys::prompt(self.user_id)).await
    }

    pub async fn scratch(&self) -> Result<Scratch, StoreError> {
        let raw = self.store.get(&keys::scratch(self.user_id)).await?;
        Ok(raw
            .and_then(|r| serde_json::from_str(&r).ok())
            .unwrap_or_default())
    }

    pub async fn set_scratch(&self, scratch: &Scratch) -> Result<(), StoreError> {
        let raw = serde_json::to_string(scratch)?;
        self.store
            .set(&keys::scratch(self.user_id), &raw, Some(SCRATCH_TTL))
            .await
    }

    pub async fn clear_conversation(&self) -> Result<(), StoreError> {
        self.store.delete(&keys::prompt(self.user_id)).await?;
        self.store.delete(&keys::scratch(self.user_id)).await
    }
}
