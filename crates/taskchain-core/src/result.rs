//! Convenience result type alias for taskchain.

use crate::error::AppError;

/// A specialized `Result` type for taskchain operations.
pub type AppResult<T> = Result<T, AppError>;
