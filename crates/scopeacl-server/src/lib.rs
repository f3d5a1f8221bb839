//! scopeacl-server: Runtime wiring and operational tooling
//!
//! This crate sits on top of the domain layer and provides:
//! - Configuration management (YAML file plus `SCOPEACL_` environment overrides)
//! - Structured logging and the Prometheus recorder
//! - Cache operations: warming, batch checks, invalidation, persisted metrics
//! - The process-wide runtime that wires stores, service and cache ops together
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              scopeacl-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs        - Configuration           │
//! │  observability/   - Logging and metrics     │
//! │  cache_ops/       - Cache optimizer         │
//! │    optimizer.rs       - Warm, batch, metrics│
//! │    invalidator.rs     - Invalidation        │
//! │  runtime.rs       - Process-wide wiring     │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache_ops;
pub mod config;
pub mod observability;
pub mod runtime;

// Re-exports for convenience
pub use cache_ops::{CacheOps, CacheOpsConfig};
pub use config::{ConfigLoadError, Environment, ServerConfig};
pub use runtime::{AclRuntime, Collaborators, MemoryRuntime, RuntimeError, RuntimeResult};
