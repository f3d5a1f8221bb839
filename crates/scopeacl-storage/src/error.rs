//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
///
/// Backends surface their failures through this type unchanged; the engine
/// above never retries or masks them.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A context with the same `(level, instance_id)` already exists.
    #[error("context already exists: {level}#{instance_id:?}")]
    ContextConflict {
        level: String,
        instance_id: Option<i64>,
    },

    /// The parent referenced by a new context does not exist.
    #[error("parent context not found: {parent_id}")]
    ParentNotFound { parent_id: i64 },

    /// Role not found.
    #[error("role not found: {role_id}")]
    RoleNotFound { role_id: i64 },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
