//! scopeacl-storage: Collaborator interfaces for the permission engine
//!
//! This crate provides the storage abstraction for scopeacl, including:
//! - Context node persistence (`ContextStore`)
//! - Bulk role assignment reads (`AssignmentReader`)
//! - The persistent key-value cache tier (`KeyValueStore`)
//! - In-memory implementations for testing and single-node use
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              scopeacl-storage                │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - Collaborator traits, records │
//! │  memory.rs   - In-memory implementations    │
//! │  error.rs    - StorageError                 │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryAssignmentStore, MemoryContextStore, MemoryKeyValueStore};
pub use traits::{
    AssignmentReader, AssignmentRow, ContextId, ContextRecord, ContextStore, KeyValueStore,
    NewContext, RoleId, UserId, ROOT_CONTEXT_ID, ROOT_LEVEL,
};
