//! Domain error types for authorization operations.

use scopeacl_storage::{ContextId, StorageError};
use thiserror::Error;

/// Domain-specific errors for authorization operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Deployment is misconfigured (e.g. the root context is missing).
    ///
    /// Fatal: callers must not retry.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Context lookup by identifiers found nothing.
    #[error("context not found: {level}#{instance_id}")]
    ContextNotFound { level: String, instance_id: i64 },

    /// A policy denied the ability.
    #[error("authorization denied for '{ability}'{}", reason_suffix(.reason))]
    AuthorizationDenied {
        ability: String,
        reason: Option<String>,
    },

    /// A stored context violates the materialized path invariant.
    #[error("corrupt path '{path}' on context {context_id}")]
    CorruptContextPath { context_id: ContextId, path: String },

    /// The parent chain of a domain object is deeper than allowed.
    #[error("context depth limit exceeded (max: {max_depth})")]
    DepthLimitExceeded { max_depth: u32 },

    /// A policy was rejected at registration.
    #[error("invalid policy for {type_name}: {message}")]
    InvalidPolicy { type_name: String, message: String },

    /// Cached snapshot could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Collaborator I/O failure, propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DomainError {
    /// Returns the policy's reason if this is a reasoned denial.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            DomainError::AuthorizationDenied { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    /// Returns true for errors that retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DomainError::Configuration { .. }
                | DomainError::CorruptContextPath { .. }
                | DomainError::DepthLimitExceeded { .. }
        )
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization {
            message: err.to_string(),
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_message_includes_reason() {
        let err = DomainError::AuthorizationDenied {
            ability: "post:update".to_string(),
            reason: Some("post is locked".to_string()),
        };

        assert_eq!(
            err.to_string(),
            "authorization denied for 'post:update': post is locked"
        );
        assert_eq!(err.denial_reason(), Some("post is locked"));
    }

    #[test]
    fn test_storage_errors_convert_transparently() {
        let err: DomainError = StorageError::ConnectionError {
            message: "refused".to_string(),
        }
        .into();

        assert_eq!(err.to_string(), "database connection error: refused");
        assert!(!err.is_fatal());
    }
}
