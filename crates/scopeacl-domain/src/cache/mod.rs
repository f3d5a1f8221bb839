//! Three-tier permission snapshot cache.
//!
//! Lookups go request-local -> shared-memory -> persistent, in that order:
//!
//! - **Tier 1** ([`RequestCache`]): owned by one unit of work and dropped with
//!   it. Never shared between units of work.
//! - **Tier 2** (shared memory): an optional Moka cache shared by every unit
//!   of work in the process, keyed `acl:l1:{user_id}`, with a short TTL.
//! - **Tier 3** (persistent): the [`KeyValueStore`] collaborator shared by all
//!   processes, keyed `acl:all_perms:{user_id}`.
//!
//! A hit in a lower tier is written back into every tier above it. A miss in
//! all tiers returns `None`; the caller loads the snapshot and calls
//! [`TieredCache::put`]. No lock guards that rebuild: concurrent misses may
//! load and write the same snapshot more than once, which is harmless because
//! the load is a pure read.
//!
//! # Example
//!
//! ```rust,ignore
//! use scopeacl_domain::cache::{CacheConfig, RequestCache, TieredCache};
//!
//! let cache = TieredCache::new(kv_store, CacheConfig::default());
//! let local = RequestCache::new();
//!
//! if cache.get(&local, 42).await?.is_none() {
//!     let snapshot = loader.load_snapshot(42).await?;
//!     cache.put(&local, 42, snapshot, cache.config().persistent_ttl).await?;
//! }
//! ```

mod counters;

pub use self::counters::{register_cache_metrics, CacheCounters, CounterSnapshot};

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache;
use scopeacl_storage::{KeyValueStore, UserId};
use tracing::{debug, warn};

use crate::error::DomainResult;
use crate::permission::PermissionSnapshot;

/// Prefix of persistent-tier snapshot keys.
pub const PERSISTENT_KEY_PREFIX: &str = "acl:all_perms:";
/// Prefix of shared-memory snapshot keys.
pub const SHARED_KEY_PREFIX: &str = "acl:l1:";
/// Key of the persisted cache metrics record.
pub const METRICS_KEY: &str = "acl:metrics";

/// Persistent-tier key for `user_id`.
pub fn persistent_key(user_id: UserId) -> String {
    format!("{PERSISTENT_KEY_PREFIX}{user_id}")
}

/// Shared-memory key for `user_id`.
pub fn shared_key(user_id: UserId) -> String {
    format!("{SHARED_KEY_PREFIX}{user_id}")
}

/// Configuration for the tiered cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL of snapshots in the persistent tier.
    pub persistent_ttl: Duration,
    /// Whether the shared-memory tier is available in this process.
    pub shared_enabled: bool,
    /// TTL of snapshots in the shared-memory tier.
    pub shared_ttl: Duration,
    /// Maximum number of snapshots held in the shared-memory tier.
    pub shared_max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persistent_ttl: Duration::from_secs(3600),
            shared_enabled: true,
            shared_ttl: Duration::from_secs(60),
            shared_max_capacity: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn with_persistent_ttl(mut self, ttl: Duration) -> Self {
        self.persistent_ttl = ttl;
        self
    }

    /// Enables or disables the shared-memory tier.
    pub fn with_shared_enabled(mut self, enabled: bool) -> Self {
        self.shared_enabled = enabled;
        self
    }

    pub fn with_shared_ttl(mut self, ttl: Duration) -> Self {
        self.shared_ttl = ttl;
        self
    }

    pub fn with_shared_max_capacity(mut self, max_capacity: u64) -> Self {
        self.shared_max_capacity = max_capacity;
        self
    }
}

/// The tier that served a cache hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Request,
    Shared,
    Persistent,
}

impl CacheTier {
    /// Label used on the `scopeacl_cache_hits_total` counter.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Request => "request",
            CacheTier::Shared => "shared",
            CacheTier::Persistent => "persistent",
        }
    }
}

/// Tier 1: snapshots held for the lifetime of one unit of work.
#[derive(Debug, Default)]
pub struct RequestCache {
    entries: DashMap<UserId, Arc<PermissionSnapshot>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: UserId) -> Option<Arc<PermissionSnapshot>> {
        self.entries.get(&user_id).map(|entry| Arc::clone(&entry))
    }

    pub fn insert(&self, user_id: UserId, snapshot: Arc<PermissionSnapshot>) {
        self.entries.insert(user_id, snapshot);
    }

    pub fn remove(&self, user_id: UserId) {
        self.entries.remove(&user_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tiers 2 and 3, plus the read-through logic that stitches Tier 1 on top.
///
/// # Thread Safety
///
/// Shared by every unit of work in the process. Tier 1 is passed in per call
/// so that this type holds no per-request state.
pub struct TieredCache<K> {
    shared: Option<Cache<String, Arc<PermissionSnapshot>>>,
    persistent: Arc<K>,
    config: CacheConfig,
    counters: Arc<CacheCounters>,
}

impl<K> std::fmt::Debug for TieredCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("config", &self.config)
            .field(
                "shared_entry_count",
                &self.shared.as_ref().map(|cache| cache.entry_count()),
            )
            .finish()
    }
}

impl<K> TieredCache<K>
where
    K: KeyValueStore,
{
    pub fn new(persistent: Arc<K>, config: CacheConfig) -> Self {
        let shared = config.shared_enabled.then(|| {
            Cache::builder()
                .max_capacity(config.shared_max_capacity)
                .time_to_live(config.shared_ttl)
                .build()
        });

        Self {
            shared,
            persistent,
            config,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Process-local counters backing the persisted metrics record.
    pub fn counters(&self) -> &Arc<CacheCounters> {
        &self.counters
    }

    /// The persistent tier, shared with metrics persistence.
    pub fn persistent(&self) -> &Arc<K> {
        &self.persistent
    }

    pub fn shared_enabled(&self) -> bool {
        self.shared.is_some()
    }

    /// Looks `user_id` up tier by tier, backfilling the tiers above a hit.
    ///
    /// Returns `Ok(None)` when every tier missed. Persistent-tier I/O errors
    /// propagate. An undecodable persistent entry is dropped and reported as
    /// a miss, so the caller's reload overwrites it.
    pub async fn get(
        &self,
        local: &RequestCache,
        user_id: UserId,
    ) -> DomainResult<Option<Arc<PermissionSnapshot>>> {
        Ok(self
            .get_with_tier(local, user_id)
            .await?
            .map(|(snapshot, _)| snapshot))
    }

    /// Like [`get`](Self::get), also reporting which tier served the hit.
    pub async fn get_with_tier(
        &self,
        local: &RequestCache,
        user_id: UserId,
    ) -> DomainResult<Option<(Arc<PermissionSnapshot>, CacheTier)>> {
        if let Some(snapshot) = local.get(user_id) {
            self.record_hit(CacheTier::Request);
            return Ok(Some((snapshot, CacheTier::Request)));
        }

        if let Some(shared) = &self.shared {
            if let Some(snapshot) = shared.get(&shared_key(user_id)).await {
                local.insert(user_id, Arc::clone(&snapshot));
                self.record_hit(CacheTier::Shared);
                debug!(user_id, "permission snapshot served from shared memory");
                return Ok(Some((snapshot, CacheTier::Shared)));
            }
        }

        let key = persistent_key(user_id);
        if let Some(bytes) = self.persistent.get(&key).await? {
            match PermissionSnapshot::from_bytes(&bytes) {
                Ok(snapshot) => {
                    let snapshot = Arc::new(snapshot);
                    if let Some(shared) = &self.shared {
                        shared.insert(shared_key(user_id), Arc::clone(&snapshot)).await;
                    }
                    local.insert(user_id, Arc::clone(&snapshot));
                    self.record_hit(CacheTier::Persistent);
                    debug!(user_id, "permission snapshot served from persistent cache");
                    return Ok(Some((snapshot, CacheTier::Persistent)));
                }
                Err(error) => {
                    warn!(user_id, %error, "dropping undecodable permission snapshot");
                    self.persistent.delete(&key).await?;
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("scopeacl_cache_misses_total").increment(1);
        Ok(None)
    }

    /// Writes `snapshot` to the persistent tier with `ttl`, then to the
    /// shared-memory tier and `local`.
    ///
    /// The persistent write happens first so that a failed write leaves no
    /// tier holding a snapshot the others do not.
    pub async fn put(
        &self,
        local: &RequestCache,
        user_id: UserId,
        snapshot: PermissionSnapshot,
        ttl: Duration,
    ) -> DomainResult<Arc<PermissionSnapshot>> {
        let bytes = snapshot.to_bytes()?;
        self.persistent
            .set(&persistent_key(user_id), bytes, ttl)
            .await?;

        let snapshot = Arc::new(snapshot);
        if let Some(shared) = &self.shared {
            shared.insert(shared_key(user_id), Arc::clone(&snapshot)).await;
        }
        local.insert(user_id, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Drops `user_id` from `local` and from the shared tiers.
    pub async fn invalidate(&self, local: &RequestCache, user_id: UserId) -> DomainResult<()> {
        local.remove(user_id);
        self.invalidate_shared(user_id).await
    }

    /// Drops `user_id` from Tiers 2 and 3 only.
    ///
    /// Other units of work keep whatever their own Tier 1 already holds.
    pub async fn invalidate_shared(&self, user_id: UserId) -> DomainResult<()> {
        if let Some(shared) = &self.shared {
            shared.invalidate(&shared_key(user_id)).await;
        }
        self.persistent.delete(&persistent_key(user_id)).await?;

        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("scopeacl_cache_invalidations_total").increment(1);
        Ok(())
    }

    fn record_hit(&self, tier: CacheTier) {
        let counter = match tier {
            CacheTier::Request => &self.counters.request_hits,
            CacheTier::Shared => &self.counters.l1_hits,
            CacheTier::Persistent => &self.counters.l2_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("scopeacl_cache_hits_total", "tier" => tier.as_str()).increment(1);
    }
}
