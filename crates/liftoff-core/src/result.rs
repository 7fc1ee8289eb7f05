//! Convenience result type alias for Liftoff.

use crate::error::AppError;

/// A specialized `Result` type for application-level operations.
pub type AppResult<T> = Result<T, AppError>;
