//! Asset registration and upload persistence
//!
//! `AssetStore` maps a session id to the location of its uploaded asset.
//! Byte persistence is delegated to the `BlobStore` capability; the store
//! itself is a pure map with last-write-wins semantics and no deletion
//! path (entries live until process restart).

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Location of a persisted asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    /// Path of the persisted blob
    pub path: PathBuf,

    /// Filename supplied with the upload
    pub filename: String,
}

/// Blob persistence capability
///
/// Stores raw uploaded bytes under a key and returns where they landed.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` under `key`, overwriting any previous blob
    async fn put(&self, key: &str, bytes: Bytes) -> Result<PathBuf>;
}

/// Blob store writing files under a local directory
pub struct DiskBlobStore {
    root: PathBuf,
    key_prefix: String,
}

impl DiskBlobStore {
    /// Create a disk blob store, creating the root directory if missing
    pub async fn new(root: PathBuf, key_prefix: String) -> Result<Self> {
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            Error::Storage(format!(
                "failed to create storage dir {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root, key_prefix })
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<PathBuf> {
        let path = self.root.join(format!("{}{}", self.key_prefix, key));

        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            Error::Storage(format!("failed to write blob {}: {}", path.display(), e))
        })?;

        debug!("Wrote {} byte blob to {}", bytes.len(), path.display());

        Ok(path)
    }
}

/// Session id → asset location mapping
pub struct AssetStore {
    blobs: std::sync::Arc<dyn BlobStore>,
    entries: RwLock<HashMap<String, AssetLocation>>,
}

impl AssetStore {
    /// Create an asset store backed by the given blob persistence capability
    pub fn new(blobs: std::sync::Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Persist an upload and register it under `session_id`
    ///
    /// Overwrites any prior asset for the same id (last-write-wins).
    pub async fn put(
        &self,
        session_id: &str,
        filename: &str,
        bytes: Bytes,
    ) -> Result<AssetLocation> {
        let size = bytes.len();
        let path = self.blobs.put(session_id, bytes).await?;

        let location = AssetLocation {
            path,
            filename: filename.to_string(),
        };

        self.entries
            .write()
            .await
            .insert(session_id.to_string(), location.clone());

        info!(
            "Registered asset for session {}: {} ({} bytes)",
            session_id, filename, size
        );

        Ok(location)
    }

    /// Look up the asset for `session_id`
    pub async fn get(&self, session_id: &str) -> Result<AssetLocation> {
        self.entries
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::AssetNotFound(session_id.to_string()))
    }

    /// Check whether an asset is registered for `session_id`
    pub async fn contains(&self, session_id: &str) -> bool {
        self.entries.read().await.contains_key(session_id)
    }
}
