//! Edit-suggestion engine configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Tuning knobs for proposing and reviewing edit suggestions.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct SuggestionConfig {
    /// Concurrent image uploads during the materialization pre-pass.
    #[serde(default = "default_upload_concurrency")]
    #[validate(range(min = 1, max = 8))]
    pub upload_concurrency: usize,

    /// Interval in milliseconds at which batched lookups are flushed.
    #[serde(default = "default_batch_interval")]
    #[validate(range(min = 1, max = 1000))]
    pub batch_interval_ms: u64,

    /// Maximum number of keys collected before a batch is flushed early.
    #[serde(default = "default_batch_max_size")]
    #[validate(range(min = 1, max = 500))]
    pub batch_max_size: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            upload_concurrency: default_upload_concurrency(),
            batch_interval_ms: default_batch_interval(),
            batch_max_size: default_batch_max_size(),
        }
    }
}

fn default_upload_concurrency() -> usize {
    2
}

fn default_batch_interval() -> u64 {
    20
}

fn default_batch_max_size() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SuggestionConfig::default();
        assert_eq!(config.upload_concurrency, 2);
        assert_eq!(config.batch_interval_ms, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = SuggestionConfig {
            upload_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
