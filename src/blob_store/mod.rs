/// Blob Storage System
///
/// Turns uploaded files into durable public URLs. Implementations take a
/// local temporary file, persist it, and report metadata such as a video's
/// duration.

pub mod disk;
pub mod probe;

pub use disk::DiskBlobStore;

use crate::error::ApiResult;
use async_trait::async_trait;
use std::path::Path;

/// Result of persisting an upload
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub url: String,
    /// Presentation length, when the blob is a readable movie file
    pub duration_seconds: Option<f64>,
}

/// Blob store collaborator
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist a local file and consume it. Fails with `UploadFailed`.
    async fn store(&self, local_path: &Path) -> ApiResult<StoredBlob>;

    /// Remove a previously stored blob; unknown URLs are ignored
    async fn delete(&self, url: &str) -> ApiResult<()>;
}

/// Delete a blob, logging instead of failing
pub async fn delete_quietly(store: &dyn BlobStore, url: &str) {
    if let Err(e) = store.delete(url).await {
        tracing::warn!(%url, "Failed to delete blob: {}", e);
    }
}
