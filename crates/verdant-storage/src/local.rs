//! Local filesystem blob storage.
//!
//! Blobs are written under `<root>/<first two chars of id>/<id>.<ext>`,
//! where the id is a fresh v4 UUID and the extension follows the MIME type.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use verdant_core::error::{AppError, ErrorKind};
use verdant_core::result::AppResult;
use verdant_core::traits::{BlobStorage, StoredBlob};

/// Blob storage backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStorage {
    root: PathBuf,
}

impl LocalBlobStorage {
    /// Create a store rooted at `root_path`, creating the directory if needed.
    pub async fn new(root_path: impl AsRef<Path>) -> AppResult<Self> {
        let root = root_path.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create blob root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// Absolute path of a blob. Rejects ids that are not `<uuid>[.<ext>]`.
    fn resolve(&self, storage_id: &str) -> AppResult<PathBuf> {
        let (stem, ext) = storage_id.split_once('.').unwrap_or((storage_id, ""));
        let well_formed = Uuid::parse_str(stem).is_ok()
            && ext.chars().all(|c| c.is_ascii_alphanumeric());
        if !well_formed {
            return Err(AppError::invalid_input(format!(
                "Malformed storage id '{storage_id}'"
            )));
        }
        Ok(self.root.join(&stem[..2]).join(storage_id))
    }
}

/// File extension for an image MIME type.
fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        _ => "bin",
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn upload(&self, data: Bytes, mime_type: &str) -> AppResult<StoredBlob> {
        let storage_id = format!("{}.{}", Uuid::new_v4(), extension_for(mime_type));
        let path = self.resolve(&storage_id)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create blob directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        fs::write(&path, &data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write blob {storage_id}"),
                e,
            )
        })?;

        debug!(storage_id = %storage_id, bytes = data.len(), "Stored blob");
        Ok(StoredBlob {
            storage_id,
            size_bytes: data.len() as u64,
            mime_type: mime_type.to_string(),
        })
    }

    async fn delete(&self, storage_id: &str) -> AppResult<()> {
        let path = self.resolve(storage_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to delete blob {storage_id}"),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path()).await.unwrap();
        assert!(storage.health_check().await.unwrap());

        let blob = storage
            .upload(Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();
        assert!(blob.storage_id.ends_with(".png"));
        assert_eq!(blob.size_bytes, 4);
        let path = storage.resolve(&blob.storage_id).unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.is_file());

        storage.delete(&blob.storage_id).await.unwrap();
        assert!(!path.exists());
        storage.delete(&blob.storage_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path()).await.unwrap();
        let err = storage.delete("../../etc/passwd").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_health_check_fails_without_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path().join("blobs")).await.unwrap();
        std::fs::remove_dir(dir.path().join("blobs")).unwrap();
        assert!(!storage.health_check().await.unwrap());
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/pdf"), "bin");
    }
}
