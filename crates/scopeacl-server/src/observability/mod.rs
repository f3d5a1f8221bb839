//! Observability infrastructure for scopeacl.
//!
//! This module provides:
//! - Structured logging configuration
//! - Prometheus recorder for the cache counters

mod logging;
mod metrics;

pub use logging::{create_json_layer, init_logging, LoggingConfig};
pub use metrics::{init_metrics, MetricsError, MetricsState};
