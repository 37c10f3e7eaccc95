//! # verdant-storage
//!
//! Blob storage backends implementing
//! [`verdant_core::traits::BlobStorage`].

pub mod local;

use std::sync::Arc;

use tracing::info;

use verdant_core::config::StorageConfig;
use verdant_core::error::AppError;
use verdant_core::result::AppResult;
use verdant_core::traits::BlobStorage;

pub use local::LocalBlobStorage;

/// Build the blob storage selected by configuration.
pub async fn from_config(config: &StorageConfig) -> AppResult<Arc<dyn BlobStorage>> {
    let storage: Arc<dyn BlobStorage> = match config.provider.as_str() {
        "local" => Arc::new(LocalBlobStorage::new(&config.local_root).await?),
        other => {
            return Err(AppError::configuration(format!(
                "Unsupported storage provider '{other}'"
            )));
        }
    };

    if !storage.health_check().await? {
        return Err(AppError::storage(format!(
            "Storage provider '{}' is not reachable",
            storage.provider_type()
        )));
    }
    info!(provider = storage.provider_type(), "Blob storage ready");
    Ok(storage)
}
