//! Counters for cache performance monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-local cache counters.
///
/// "L1" is the shared-memory tier and "L2" the persistent tier, matching the
/// names operational tooling reads from the persisted `acl:metrics` record.
/// Request-local hits are counted separately and excluded from the hit rate.
#[derive(Debug, Default)]
pub struct CacheCounters {
    /// Hits served from the unit of work's own map.
    pub request_hits: AtomicU64,
    /// Hits served from the shared-memory tier.
    pub l1_hits: AtomicU64,
    /// Hits served from the persistent tier.
    pub l2_hits: AtomicU64,
    /// Lookups that missed every tier.
    pub misses: AtomicU64,
    /// Number of abilities checked through batch checks.
    pub batch_checks: AtomicU64,
    /// Number of user invalidations.
    pub invalidations: AtomicU64,
}

impl CacheCounters {
    /// Returns a snapshot of the current counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            request_hits: self.request_hits.load(Ordering::Relaxed),
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            batch_checks: self.batch_checks.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Atomically reads and zeroes every counter.
    ///
    /// Used when flushing deltas into the persisted metrics record.
    pub fn take(&self) -> CounterSnapshot {
        CounterSnapshot {
            request_hits: self.request_hits.swap(0, Ordering::Relaxed),
            l1_hits: self.l1_hits.swap(0, Ordering::Relaxed),
            l2_hits: self.l2_hits.swap(0, Ordering::Relaxed),
            misses: self.misses.swap(0, Ordering::Relaxed),
            batch_checks: self.batch_checks.swap(0, Ordering::Relaxed),
            invalidations: self.invalidations.swap(0, Ordering::Relaxed),
        }
    }

    /// Adds a snapshot back, e.g. after a failed flush.
    pub fn restore(&self, delta: &CounterSnapshot) {
        self.request_hits
            .fetch_add(delta.request_hits, Ordering::Relaxed);
        self.l1_hits.fetch_add(delta.l1_hits, Ordering::Relaxed);
        self.l2_hits.fetch_add(delta.l2_hits, Ordering::Relaxed);
        self.misses.fetch_add(delta.misses, Ordering::Relaxed);
        self.batch_checks
            .fetch_add(delta.batch_checks, Ordering::Relaxed);
        self.invalidations
            .fetch_add(delta.invalidations, Ordering::Relaxed);
    }

    /// Returns the cache hit ratio `(l1 + l2) / (l1 + l2 + misses)`.
    /// Returns 0.0 if no hits or misses have occurred.
    pub fn hit_ratio(&self) -> f64 {
        self.snapshot().hit_ratio()
    }
}

/// A point-in-time copy of [`CacheCounters`], also the persisted form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    #[serde(default)]
    pub request_hits: u64,
    #[serde(default)]
    pub l1_hits: u64,
    #[serde(default)]
    pub l2_hits: u64,
    #[serde(default)]
    pub misses: u64,
    #[serde(default)]
    pub batch_checks: u64,
    #[serde(default)]
    pub invalidations: u64,
}

impl CounterSnapshot {
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.l1_hits + self.l2_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Field-wise sum of two snapshots.
    pub fn merged(&self, other: &CounterSnapshot) -> CounterSnapshot {
        CounterSnapshot {
            request_hits: self.request_hits + other.request_hits,
            l1_hits: self.l1_hits + other.l1_hits,
            l2_hits: self.l2_hits + other.l2_hits,
            misses: self.misses + other.misses,
            batch_checks: self.batch_checks + other.batch_checks,
            invalidations: self.invalidations + other.invalidations,
        }
    }
}

/// Registers cache metric descriptions with the installed recorder.
///
/// Optional; call once at startup for better exporter documentation.
///
/// # Metrics Registered
///
/// - `scopeacl_cache_hits_total` - Cache hits, labelled by `tier`
/// - `scopeacl_cache_misses_total` - Lookups that missed every tier
/// - `scopeacl_cache_invalidations_total` - User invalidations
/// - `scopeacl_snapshot_loads_total` - Permission snapshots loaded from storage
/// - `scopeacl_batch_checks_total` - Abilities checked through batch checks
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "scopeacl_cache_hits_total",
        "Total number of permission cache hits by tier"
    );
    metrics::describe_counter!(
        "scopeacl_cache_misses_total",
        "Total number of permission cache misses across all tiers"
    );
    metrics::describe_counter!(
        "scopeacl_cache_invalidations_total",
        "Total number of user snapshot invalidations"
    );
    metrics::describe_counter!(
        "scopeacl_snapshot_loads_total",
        "Total number of permission snapshots loaded from storage"
    );
    metrics::describe_counter!(
        "scopeacl_batch_checks_total",
        "Total number of abilities checked through batch checks"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio_ignores_request_hits() {
        let snapshot = CounterSnapshot {
            request_hits: 100,
            l1_hits: 6,
            l2_hits: 2,
            misses: 2,
            ..Default::default()
        };

        assert!((snapshot.hit_ratio() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_ratio_without_traffic_is_zero() {
        assert_eq!(CounterSnapshot::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_take_resets_counters() {
        let counters = CacheCounters::default();
        counters.misses.fetch_add(3, Ordering::Relaxed);

        let taken = counters.take();

        assert_eq!(taken.misses, 3);
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn test_restore_adds_back() {
        let counters = CacheCounters::default();
        counters.l1_hits.fetch_add(1, Ordering::Relaxed);
        let taken = counters.take();

        counters.restore(&taken);

        assert_eq!(counters.snapshot().l1_hits, 1);
    }
}
