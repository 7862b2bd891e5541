//! # Local blob storage
//!
//! Filesystem implementation of `BlobStorage`.
//! Features: content-addressable storage under a caller namespace, directory sharding.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use domains::{BlobStorage, StoreError};
use mime::Mime;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};

pub struct LocalBlobStorage {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/uploads")
    url_prefix: String,
}

impl LocalBlobStorage {
    pub fn new(root: PathBuf, url_prefix: impl Into<String>) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Generates a sharded relative path: "<namespace>/ab/cd/<hash>.<ext>"
    fn relative_path(namespace: &Path, hash: &str, ext: &str) -> PathBuf {
        let mut path = namespace.to_path_buf();
        path.push(&hash[0..2]);
        path.push(&hash[2..4]);
        path.push(format!("{hash}.{ext}"));
        path
    }

    /// Rejects absolute paths and parent traversal in the caller-supplied namespace.
    fn namespace(path: &str) -> Result<PathBuf, StoreError> {
        let candidate = Path::new(path.trim_matches('/'));
        let mut clean = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                _ => return Err(StoreError::PermissionDenied(format!("invalid blob path `{path}`"))),
            }
        }
        Ok(clean)
    }

    fn extension(content_type: &Mime) -> &'static str {
        mime_guess::get_mime_extensions(content_type)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin")
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    /// Saves an upload using its SHA-256 hash as the filename.
    /// Identical bytes in the same namespace are written once.
    async fn upload(&self, path: &str, data: Bytes, content_type: &Mime) -> Result<String, StoreError> {
        let hash = hex::encode(Sha256::digest(&data));
        let relative = Self::relative_path(&Self::namespace(path)?, &hash, Self::extension(content_type));
        let target = self.root_path.join(&relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }

        if fs::try_exists(&target).await.unwrap_or(false) {
            debug!(path = %target.display(), "blob already stored");
        } else {
            fs::write(&target, &data)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", target.display())))?;
            info!(path = %target.display(), bytes = data.len(), "blob stored");
        }

        let url_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Ok(format!("{}/{}", self.url_prefix, url_path))
    }
}
