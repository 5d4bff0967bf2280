//! Blob storage for uploaded source files
//!
//! The ingestion pipeline only needs `download(key) -> bytes`; the local
//! filesystem implementation also handles uploads for the CLI path.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage for raw uploaded files, keyed by an opaque string
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the raw bytes for a stored file
    async fn download(&self, key: &str) -> Result<Vec<u8>>;

    /// Store raw bytes under a key
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Filesystem-backed blob store rooted at a single directory
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Keys are generated by us (uuid + file name); reject traversal anyway
        if key.contains("..") || key.starts_with('/') {
            return Err(Error::InvalidPath(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        debug!(key, path = %path.display(), "Downloading blob");
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Blob(format!("{}: {}", key, e)))
    }

    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(key, size = bytes.len(), "Storing blob");
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Blob(format!("{}: {}", key, e)))
    }
}

/// Build a blob key for an uploaded file
pub fn blob_key(document_id: &str, file_name: &Path) -> String {
    let name = file_name
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    format!("{}/{}", document_id, name)
}
