/// Disk-based blob storage
use crate::{
    blob_store::{probe, BlobStore, StoredBlob},
    error::{ApiError, ApiResult},
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Disk blob store
///
/// Files are content-addressed by SHA-256 and sharded by the first two hex
/// characters: `{base}/{hash[..2]}/{hash}.{ext}`. The base directory is served
/// publicly under `public_base`.
#[derive(Clone)]
pub struct DiskBlobStore {
    base_path: PathBuf,
    public_base: String,
}

impl DiskBlobStore {
    pub fn new(base_path: PathBuf, public_base: &str) -> Self {
        Self {
            base_path,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Relative location for content with the given hash and extension
    fn blob_key(hash: &str, ext: Option<&str>) -> String {
        let name = match ext {
            Some(ext) => format!("{}.{}", hash, ext),
            None => hash.to_string(),
        };
        format!("{}/{}", &hash[0..2], name)
    }

    /// Map a public URL back to a path under the base directory
    fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let key = url.strip_prefix(&self.public_base)?.strip_prefix('/')?;
        let relative = Path::new(key);

        if relative.components().all(|c| matches!(c, Component::Normal(_))) {
            Some(self.base_path.join(relative))
        } else {
            None
        }
    }
}

/// Lower-cased alphanumeric extension of the uploaded file, if any
fn clean_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext)
    } else {
        None
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn store(&self, local_path: &Path) -> ApiResult<StoredBlob> {
        let data = fs::read(local_path).await.map_err(|e| {
            ApiError::UploadFailed(format!("Failed to read upload {}: {}", local_path.display(), e))
        })?;

        let hash = hex::encode(Sha256::digest(&data));
        let key = Self::blob_key(&hash, clean_extension(local_path).as_deref());
        let blob_path = self.base_path.join(&key);

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::UploadFailed(format!("Failed to create blob directory: {}", e)))?;
        }

        fs::write(&blob_path, &data)
            .await
            .map_err(|e| ApiError::UploadFailed(format!("Failed to write blob {}: {}", key, e)))?;

        if let Err(e) = fs::remove_file(local_path).await {
            tracing::warn!("Failed to remove temporary upload {}: {}", local_path.display(), e);
        }

        let stored = StoredBlob {
            url: format!("{}/{}", self.public_base, key),
            duration_seconds: probe::mp4_duration(&data),
        };

        tracing::debug!(url = %stored.url, bytes = data.len(), "Stored blob");
        Ok(stored)
    }

    async fn delete(&self, url: &str) -> ApiResult<()> {
        let Some(blob_path) = self.path_for_url(url) else {
            tracing::debug!(%url, "Not a locally stored blob, skipping delete");
            return Ok(());
        };

        match fs::remove_file(&blob_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Io(e)),
        }
    }
}
