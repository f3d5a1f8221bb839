//! scopeacl-domain: Context-scoped permission resolution
//!
//! This crate contains the authorization decision logic including:
//! - The context tree and resolution of domain objects to contexts
//! - Bulk loading of per-user permission snapshots
//! - The three-tier snapshot cache
//! - Per-type policies
//! - The access control service tying them together
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               scopeacl-domain                │
//! ├─────────────────────────────────────────────┤
//! │  context/    - Context tree & resolver      │
//! │  permission/ - Snapshots & bulk loader      │
//! │  cache/      - Tiered snapshot cache        │
//! │  policy/     - Typed policy registry        │
//! │  access/     - Check / HasRole / sessions   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod cache;
pub mod context;
pub mod error;
pub mod permission;
pub mod policy;

// Re-export commonly used types at the crate root
pub use access::{AccessControlService, AccessSession, ServiceConfig, SUPER_ADMIN_ROLE};
pub use cache::{CacheConfig, RequestCache, TieredCache};
pub use context::{Context, ContextResolver, DomainObject, HasParentContext, ParentRegistry, Subject};
pub use error::{DomainError, DomainResult};
pub use permission::{PermissionLoader, PermissionSnapshot};
pub use policy::{AbilityResponse, BeforeVerdict, Policy, PolicyRegistry};
