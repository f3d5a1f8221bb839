//! Cache warming, batch checks and persisted cache metrics.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::Instant;

use scopeacl_domain::cache::{CounterSnapshot, METRICS_KEY};
use scopeacl_domain::{DomainError, DomainResult, Subject};
use scopeacl_storage::{AssignmentReader, ContextStore, KeyValueStore, UserId};
use tracing::{debug, info, warn};

use super::types::{
    BatchCheckError, BatchCheckResponse, BatchCheckResult, CacheMetricsReport, WarmStats,
    MAX_BATCH_SIZE, WARMUP_ABILITY,
};
use super::CacheOps;

impl<C, A, K> CacheOps<C, A, K>
where
    C: ContextStore,
    A: AssignmentReader,
    K: KeyValueStore,
{
    /// Reloads and caches the snapshot of each user.
    ///
    /// Each user is invalidated, then checked against a throwaway ability in
    /// a fresh unit of work so the normal load path repopulates every tier.
    /// Failures are counted and logged; they never abort the batch.
    pub async fn warm_cache(&self, users: &[UserId]) -> WarmStats {
        let start = Instant::now();
        let mut stats = WarmStats {
            total: users.len(),
            ..Default::default()
        };

        for &user in users {
            match self.warm_user(user).await {
                Ok(()) => stats.warmed += 1,
                Err(error) => {
                    stats.failed += 1;
                    metrics::counter!("scopeacl_cache_warm_failures_total").increment(1);
                    warn!(user_id = user, %error, "failed to warm permission snapshot");
                }
            }
        }

        stats.duration = start.elapsed();
        metrics::histogram!("scopeacl_cache_warm_duration_seconds")
            .record(stats.duration.as_secs_f64());
        info!(
            total = stats.total,
            warmed = stats.warmed,
            failed = stats.failed,
            duration_ms = stats.duration.as_millis() as u64,
            "cache warm finished"
        );
        stats
    }

    async fn warm_user(&self, user: UserId) -> DomainResult<()> {
        self.service.cache().invalidate_shared(user).await?;
        self.service
            .session()
            .check(user, WARMUP_ABILITY, Subject::Root)
            .await?;
        Ok(())
    }

    /// Validates a batch of ability names.
    pub fn validate_batch<S: AsRef<str>>(&self, abilities: &[S]) -> BatchCheckResult<()> {
        if abilities.is_empty() {
            return Err(BatchCheckError::EmptyBatch);
        }

        if abilities.len() > MAX_BATCH_SIZE {
            return Err(BatchCheckError::BatchTooLarge {
                size: abilities.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        for (index, ability) in abilities.iter().enumerate() {
            if ability.as_ref().trim().is_empty() {
                return Err(BatchCheckError::InvalidAbility {
                    index,
                    message: "ability cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Checks every ability in `abilities` for `user` on `subject`.
    ///
    /// All checks share one unit of work, so the snapshot is read at most
    /// once. Repeated abilities are checked once. A policy denial with a
    /// reason is reported as `false`; any other error fails the batch.
    pub async fn check_batch<S: AsRef<str>>(
        &self,
        user: UserId,
        abilities: &[S],
        subject: Subject<'_>,
    ) -> BatchCheckResult<BatchCheckResponse> {
        self.validate_batch(abilities)?;
        let start = Instant::now();

        let session = self.service.session();
        let mut results = BTreeMap::new();
        for ability in abilities {
            let ability = ability.as_ref();
            if results.contains_key(ability) {
                continue;
            }
            let allowed = match session.check(user, ability, subject).await {
                Ok(allowed) => allowed,
                Err(DomainError::AuthorizationDenied { .. }) => false,
                Err(error) => return Err(error.into()),
            };
            results.insert(ability.to_string(), allowed);
        }

        let duration = start.elapsed();
        self.service
            .cache()
            .counters()
            .batch_checks
            .fetch_add(abilities.len() as u64, Ordering::Relaxed);
        metrics::counter!("scopeacl_batch_checks_total").increment(abilities.len() as u64);
        metrics::histogram!("scopeacl_batch_check_duration_seconds")
            .record(duration.as_secs_f64());
        debug!(
            user_id = user,
            total = abilities.len(),
            unique = results.len(),
            "batch check finished"
        );

        Ok(BatchCheckResponse {
            results,
            total: abilities.len(),
            duration,
        })
    }

    /// Persisted counters plus this process's unflushed deltas, with the
    /// derived hit rate and recommendations.
    pub async fn metrics_report(&self) -> DomainResult<CacheMetricsReport> {
        let cache = self.service.cache();
        let counters = self
            .stored_counters()
            .await?
            .merged(&cache.counters().snapshot());
        let shared_memory_enabled = cache.shared_enabled();

        Ok(CacheMetricsReport {
            counters,
            hit_rate: counters.hit_ratio(),
            shared_memory_enabled,
            recommendations: recommendations(
                &counters,
                shared_memory_enabled,
                self.config.hit_rate_threshold,
            ),
        })
    }

    /// Adds this process's counters to the `acl:metrics` record and resets
    /// them, returning the new totals.
    ///
    /// The local counters are restored if the write fails. With metrics
    /// persistence disabled nothing is written and the local counters are
    /// returned unchanged.
    pub async fn persist_metrics(&self) -> DomainResult<CounterSnapshot> {
        let counters = self.service.cache().counters();
        if !self.config.metrics_enabled {
            return Ok(counters.snapshot());
        }

        let delta = counters.take();
        match self.write_merged(&delta).await {
            Ok(totals) => Ok(totals),
            Err(error) => {
                counters.restore(&delta);
                Err(error)
            }
        }
    }

    async fn write_merged(&self, delta: &CounterSnapshot) -> DomainResult<CounterSnapshot> {
        let totals = self.stored_counters().await?.merged(delta);
        let bytes = serde_json::to_vec(&totals)?;
        self.service
            .cache()
            .persistent()
            .set(METRICS_KEY, bytes, self.config.metrics_ttl)
            .await?;
        debug!(hit_rate = totals.hit_ratio(), "persisted cache metrics");
        Ok(totals)
    }

    async fn stored_counters(&self) -> DomainResult<CounterSnapshot> {
        let Some(bytes) = self.service.cache().persistent().get(METRICS_KEY).await? else {
            return Ok(CounterSnapshot::default());
        };
        match serde_json::from_slice(&bytes) {
            Ok(counters) => Ok(counters),
            Err(error) => {
                warn!(%error, "discarding unreadable cache metrics record");
                Ok(CounterSnapshot::default())
            }
        }
    }
}

/// Canned advice derived from the counters.
pub(crate) fn recommendations(
    counters: &CounterSnapshot,
    shared_memory_enabled: bool,
    hit_rate_threshold: f64,
) -> Vec<String> {
    let mut advice = Vec::new();
    let hits = counters.l1_hits + counters.l2_hits;
    let lookups = hits + counters.misses;

    if lookups > 0 && counters.hit_ratio() < hit_rate_threshold {
        advice.push(format!(
            "Hit rate {:.1}% is below {:.0}%: warm cache for active users",
            counters.hit_ratio() * 100.0,
            hit_rate_threshold * 100.0
        ));
    }
    if !shared_memory_enabled {
        advice.push(
            "Shared-memory tier is disabled: enable it to serve repeat checks without a persistent-store round-trip"
                .to_string(),
        );
    }
    if counters.invalidations > hits {
        advice.push(
            "Invalidations outnumber cache hits: batch role and permission changes before invalidating"
                .to_string(),
        );
    }
    advice
}
