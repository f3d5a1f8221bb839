//! Operational cache tooling: warming, batch checks, invalidation, metrics.
//!
//! [`CacheOps`] wraps a shared
//! [`AccessControlService`](scopeacl_domain::AccessControlService) and its
//! tiered cache. Operations that touch the cache clear Tiers 2 and 3 only;
//! units of work already in flight keep their own request-local snapshots
//! until they end.

mod invalidator;
mod optimizer;
mod types;


pub use types::{
    BatchCheckError, BatchCheckResponse, BatchCheckResult, CacheMetricsReport, WarmStats,
    MAX_BATCH_SIZE, WARMUP_ABILITY,
};

use std::sync::Arc;
use std::time::Duration;

use scopeacl_domain::AccessControlService;

use crate::config::MetricsSettings;

/// Configuration for [`CacheOps`].
#[derive(Debug, Clone)]
pub struct CacheOpsConfig {
    /// Persist counters under `acl:metrics`.
    pub metrics_enabled: bool,
    /// TTL of the persisted metrics record.
    pub metrics_ttl: Duration,
    /// Hit rate below which warming is recommended.
    pub hit_rate_threshold: f64,
}

impl Default for CacheOpsConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_ttl: Duration::from_secs(86_400),
            hit_rate_threshold: 0.85,
        }
    }
}

impl From<&MetricsSettings> for CacheOpsConfig {
    fn from(settings: &MetricsSettings) -> Self {
        Self {
            metrics_enabled: settings.enabled,
            metrics_ttl: Duration::from_secs(settings.ttl_secs),
            hit_rate_threshold: settings.hit_rate_threshold,
        }
    }
}

/// Cache optimizer and invalidator over one access control service.
pub struct CacheOps<C, A, K> {
    service: Arc<AccessControlService<C, A, K>>,
    config: CacheOpsConfig,
}

impl<C, A, K> CacheOps<C, A, K> {
    pub fn new(service: Arc<AccessControlService<C, A, K>>, config: CacheOpsConfig) -> Self {
        Self { service, config }
    }

    pub fn service(&self) -> &Arc<AccessControlService<C, A, K>> {
        &self.service
    }

    pub fn config(&self) -> &CacheOpsConfig {
        &self.config
    }
}

impl<C, A, K> Clone for CacheOps<C, A, K> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            config: self.config.clone(),
        }
    }
}
