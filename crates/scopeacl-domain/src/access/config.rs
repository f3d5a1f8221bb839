//! Configuration for the access control service.

use crate::cache::CacheConfig;
use crate::context::DEFAULT_MAX_DEPTH;

/// Configuration for [`AccessControlService`](super::AccessControlService).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Tier 2 and Tier 3 settings.
    pub cache: CacheConfig,
    /// Maximum parent chain length followed when creating contexts.
    pub max_context_depth: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            max_context_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ServiceConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_max_context_depth(mut self, max_depth: u32) -> Self {
        self.max_context_depth = max_depth;
        self
    }
}
