//! Data types for cache operations.

use std::collections::BTreeMap;
use std::time::Duration;

use scopeacl_domain::cache::CounterSnapshot;
use scopeacl_domain::DomainError;
use serde::Serialize;

/// Maximum number of abilities in one batch check.
pub const MAX_BATCH_SIZE: usize = 50;

/// Ability checked to trigger the normal load path when warming.
pub const WARMUP_ABILITY: &str = "__warmup__";

/// Outcome of warming a set of users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmStats {
    pub total: usize,
    pub warmed: usize,
    pub failed: usize,
    pub duration: Duration,
}

/// Results of a batch check, keyed by ability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCheckResponse {
    pub results: BTreeMap<String, bool>,
    /// Abilities in the request, duplicates included.
    pub total: usize,
    pub duration: Duration,
}

impl BatchCheckResponse {
    /// Result for `ability`, `None` if it was not in the batch.
    pub fn allowed(&self, ability: &str) -> Option<bool> {
        self.results.get(ability).copied()
    }

    /// Number of distinct abilities checked.
    pub fn unique(&self) -> usize {
        self.results.len()
    }
}

/// Errors that can occur during batch check operations.
#[derive(Debug, thiserror::Error)]
pub enum BatchCheckError {
    /// The batch request is empty.
    #[error("batch request cannot be empty")]
    EmptyBatch,

    /// The batch request exceeds the maximum allowed size.
    #[error("batch size {size} exceeds maximum allowed {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// An ability name is blank.
    #[error("invalid ability at index {index}: {message}")]
    InvalidAbility { index: usize, message: String },

    /// A check failed for a reason other than a policy denial.
    #[error("check error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for batch check operations.
pub type BatchCheckResult<T> = Result<T, BatchCheckError>;

/// Cache counters with the derived hit rate and recommendations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetricsReport {
    /// Persisted counters plus this process's unflushed deltas.
    pub counters: CounterSnapshot,
    /// `(l1 + l2) / (l1 + l2 + misses)`
    pub hit_rate: f64,
    pub shared_memory_enabled: bool,
    pub recommendations: Vec<String>,
}
