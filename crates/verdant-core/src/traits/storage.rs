//! Blob storage trait for hosting uploaded images.

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;

/// Reference returned by a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredBlob {
    /// Stable storage identifier used by image records.
    pub storage_id: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// MIME type recorded at upload time.
    pub mime_type: String,
}

/// Trait for image hosting backends.
///
/// The [`BlobStorage`] trait is defined here in `verdant-core` and
/// implemented in `verdant-storage`.
#[async_trait]
pub trait BlobStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local").
    fn provider_type(&self) -> &str;

    /// Check whether the provider is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Store a binary payload and return its storage identifier.
    async fn upload(&self, data: Bytes, mime_type: &str) -> AppResult<StoredBlob>;

    /// Delete a blob by storage identifier.
    async fn delete(&self, storage_id: &str) -> AppResult<()>;
}
