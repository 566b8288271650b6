//! Object storage trait definitions.

use async_trait::async_trait;

use super::StorageResult;

/// A stored object and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Key within the store.
    pub key: String,
    /// Public URL clients (and the media resolver) can fetch.
    pub url: String,
    /// Size in bytes.
    pub size: u64,
}

/// Blob storage with public URL issuance.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a blob under `key` and return its public handle.
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<StoredObject>;

    /// Read a blob's contents.
    async fn read(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete a blob. Deleting a missing blob is an error, not a no-op.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Public URL for a key.
    fn url_for(&self, key: &str) -> String;

    /// Inverse of [`ObjectStore::url_for`]: the key a public URL refers to,
    /// if it belongs to this store.
    fn key_for_url(&self, url: &str) -> Option<String>;
}
