//! Session token storage
//!
//! One `get/set/clear` interface over however many persistence layers the
//! environment has. Callers never touch the layers directly.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current token, if any layer holds one
    async fn get(&self) -> Option<String>;

    async fn set(&self, token: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Process-local token
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    async fn set(&self, token: &str) -> Result<()> {
        *self.token.write() = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.token.write() = None;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredToken {
    token: String,
    saved_at: DateTime<Utc>,
}

/// Token persisted as a small JSON file
pub struct FileTokenStore {
    storage_path: PathBuf,
}

impl FileTokenStore {
    pub fn new(storage_path: PathBuf) -> Self {
        Self { storage_path }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self) -> Option<String> {
        let content = match fs::read_to_string(&self.storage_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("TokenStore: no token file at {:?}", self.storage_path);
                return None;
            }
            Err(e) => {
                error!("TokenStore: failed to read token file: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<StoredToken>(&content) {
            Ok(stored) => Some(stored.token),
            Err(e) => {
                warn!("TokenStore: ignoring unreadable token file: {}", e);
                None
            }
        }
    }

    async fn set(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.storage_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let stored = StoredToken {
            token: token.to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        // Staged beside the target with owner-only permissions, then renamed over it
        let staging = self.storage_path.with_extension("tmp");
        match fs::remove_file(&staging).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            options.mode(0o600); // Read/write for owner only
        }
        let mut file = options.open(&staging).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&staging, &self.storage_path).await?;

        info!("TokenStore: token saved to {:?}", self.storage_path);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.storage_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Several stores kept in step: written and cleared together, read in order
///
/// A failed `set` puts back what the earlier layers held. A failed `clear`
/// still clears every other layer before reporting the first error.
pub struct LayeredTokenStore {
    layers: Vec<Arc<dyn TokenStore>>,
}

impl LayeredTokenStore {
    pub fn new(layers: Vec<Arc<dyn TokenStore>>) -> Self {
        Self { layers }
    }
}

#[async_trait]
impl TokenStore for LayeredTokenStore {
    async fn get(&self) -> Option<String> {
        for layer in &self.layers {
            if let Some(token) = layer.get().await {
                return Some(token);
            }
        }
        None
    }

    async fn set(&self, token: &str) -> Result<()> {
        let mut previous: Vec<Option<String>> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let before = layer.get().await;
            if let Err(e) = layer.set(token).await {
                warn!(
                    "TokenStore: layer {} rejected token, restoring earlier layers",
                    previous.len()
                );
                for (written, before) in self.layers.iter().zip(previous) {
                    let restored = match before {
                        Some(old) => written.set(&old).await,
                        None => written.clear().await,
                    };
                    if let Err(restore_err) = restored {
                        error!("TokenStore: failed to restore layer: {}", restore_err);
                    }
                }
                return Err(e);
            }
            previous.push(before);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut first_error = None;
        for layer in &self.layers {
            if let Err(e) = layer.clear().await {
                warn!("TokenStore: failed to clear layer: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
