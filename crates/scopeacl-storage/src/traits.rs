//! Collaborator traits consumed by the permission engine.
//!
//! The engine never talks to a database or cache server directly. It needs
//! exactly three capabilities, each expressed as one trait here:
//!
//! - [`ContextStore`] - persist and look up context nodes
//! - [`AssignmentReader`] - bulk-read a user's role assignments
//! - [`KeyValueStore`] - the persistent cross-process cache tier

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// Identifier of a context node.
pub type ContextId = i64;

/// Identifier of a user.
pub type UserId = i64;

/// Identifier of a role.
pub type RoleId = i64;

/// Id of the root ("system") context. Always present in a deployed store.
pub const ROOT_CONTEXT_ID: ContextId = 1;

/// Level tag of the root context.
pub const ROOT_LEVEL: &str = "system";

/// A context row as stored by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: ContextId,
    pub parent_id: Option<ContextId>,
    pub level: String,
    pub instance_id: Option<i64>,
    pub depth: u32,
    /// Materialized path, e.g. `1/5/12/`.
    pub path: String,
}

impl ContextRecord {
    /// The record of the root context as every backend must seed it.
    pub fn root() -> Self {
        Self {
            id: ROOT_CONTEXT_ID,
            parent_id: None,
            level: ROOT_LEVEL.to_string(),
            instance_id: None,
            depth: 0,
            path: format!("{ROOT_CONTEXT_ID}/"),
        }
    }
}

/// Input for creating a context.
///
/// The id is assigned by the backend, so the backend also finishes the path:
/// the stored path must be `parent_path` followed by the new id and `/`,
/// written in the same insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContext {
    pub parent_id: ContextId,
    pub level: String,
    pub instance_id: i64,
    pub depth: u32,
    pub parent_path: String,
}

impl NewContext {
    /// Returns the materialized path for a context that received `id`.
    pub fn path_for(&self, id: ContextId) -> String {
        format!("{}{id}/", self.parent_path)
    }
}

/// One row of the bulk assignment read: a role held at a context, with the
/// role's permissions attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRow {
    pub role_id: RoleId,
    pub role_name: String,
    pub context_id: ContextId,
    pub permission_names: Vec<String>,
}

/// Persistence for context nodes.
#[async_trait]
pub trait ContextStore: Send + Sync + 'static {
    /// Gets a context by id.
    async fn get_context(&self, id: ContextId) -> StorageResult<Option<ContextRecord>>;

    /// Finds the context owned by the domain object `(level, instance_id)`.
    async fn find_context(
        &self,
        level: &str,
        instance_id: i64,
    ) -> StorageResult<Option<ContextRecord>>;

    /// Creates a context and returns the stored record.
    ///
    /// Returns [`StorageError::ContextConflict`](crate::StorageError::ContextConflict)
    /// if `(level, instance_id)` is already taken.
    async fn create_context(&self, context: NewContext) -> StorageResult<ContextRecord>;
}

/// Bulk read of role assignments.
#[async_trait]
pub trait AssignmentReader: Send + Sync + 'static {
    /// Loads every role assignment of a user, with role name and permission
    /// names attached, in a single round-trip.
    async fn load_assignments(&self, user_id: UserId) -> StorageResult<Vec<AssignmentRow>>;
}

/// Cross-process key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Gets the value under `key`, if present and not expired.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Sets `key` to `value`, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Deletes `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}
