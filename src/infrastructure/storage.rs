// Object storage - per-bucket file upload and public URL resolution for media

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::{AppError, AppResult};

pub const POST_MEDIA_BUCKET: &str = "post-media";
pub const AVATARS_BUCKET: &str = "avatars";
pub const BANNERS_BUCKET: &str = "banners";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `bucket/path`. Without `upsert`, an existing object is a conflict.
    async fn upload(&self, bucket: &str, path: &str, bytes: &[u8], upsert: bool) -> AppResult<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Filesystem-backed object store. Objects live at `{root}/{bucket}/{path}` and are
/// served by the HTTP layer under `/storage/v1/object/public/`.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn object_path(&self, bucket: &str, path: &str) -> AppResult<PathBuf> {
        let relative = Path::new(path);
        let safe = !bucket.is_empty()
            && !bucket.contains(['/', '\\'])
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe || path.is_empty() {
            return Err(AppError::Validation(format!("Invalid object path {}/{}", bucket, path)));
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, bucket: &str, path: &str, bytes: &[u8], upsert: bool) -> AppResult<()> {
        let target = self.object_path(bucket, path)?;

        if !upsert && tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(AppError::Conflict(format!("Object {}/{} already exists", bucket, path)));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write {}/{}: {}", bucket, path, e)))?;

        debug!(bucket, path, size = bytes.len(), "object stored");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.public_base_url, bucket, path
        )
    }
}

/// Extension of an uploaded file name, lowercased; files without one are stored as `bin`.
pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}
