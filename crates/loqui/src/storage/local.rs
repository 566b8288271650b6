//! Local filesystem object store.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{ObjectStore, StorageError, StorageResult, StoredObject};

/// Filesystem-backed object store serving blobs under a public base URL.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    /// Base directory for blobs.
    root: PathBuf,
    /// URL prefix under which blobs are served, without trailing slash.
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn full_path(&self, key: &str) -> StorageResult<PathBuf> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        // Reject traversal components before touching the filesystem.
        if Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<StoredObject> {
        let full_path = self.full_path(key)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full_path, data).await?;
        debug!("wrote {} bytes to {}", data.len(), full_path.display());

        Ok(StoredObject {
            key: key.trim_start_matches('/').to_string(),
            url: self.url_for(key),
            size: data.len() as u64,
        })
    }

    async fn read(&self, key: &str) -> StorageResult<Vec<u8>> {
        let full_path = self.full_path(key)?;
        fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let full_path = self.full_path(key)?;

        if !full_path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        fs::remove_file(&full_path).await?;
        debug!("deleted {}", full_path.display());
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key.trim_start_matches('/'))
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.public_base_url)?;
        let key = rest.trim_start_matches('/');
        (!key.is_empty()).then(|| key.to_string())
    }
}
