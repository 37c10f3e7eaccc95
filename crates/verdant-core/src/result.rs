//! Convenience result type alias for Verdant.

use crate::error::AppError;

/// A specialized `Result` type for Verdant operations.
pub type AppResult<T> = Result<T, AppError>;
