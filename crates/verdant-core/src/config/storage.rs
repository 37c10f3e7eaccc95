//! Blob storage configuration.

use serde::{Deserialize, Serialize};

/// Image blob storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage provider to use (only `"local"` ships with Verdant).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Root path for locally stored blobs.
    #[serde(default = "default_local_root")]
    pub local_root: String,
    /// Maximum size of a single uploaded image in bytes (default 10 MB).
    #[serde(default = "default_max_image")]
    pub max_image_size_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            local_root: default_local_root(),
            max_image_size_bytes: default_max_image(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_local_root() -> String {
    "./data/blobs".to_string()
}

fn default_max_image() -> u64 {
    10_485_760 // 10 MB
}
