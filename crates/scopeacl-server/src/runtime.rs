//! Process-wide wiring of stores, the access control service and cache ops.
//!
//! An [`AclRuntime`] is built once at startup from a [`ServerConfig`] and
//! cloned into whatever serves requests. Each request opens its own
//! [`AccessSession`] through [`AclRuntime::session`].

use std::sync::Arc;
use std::time::Duration;

use scopeacl_domain::{
    AccessControlService, AccessSession, DomainError, ParentRegistry, PolicyRegistry,
};
use scopeacl_storage::{
    AssignmentReader, ContextStore, KeyValueStore, MemoryAssignmentStore, MemoryContextStore,
    MemoryKeyValueStore,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache_ops::{CacheOps, CacheOpsConfig};
use crate::config::{ConfigLoadError, Environment, ServerConfig};

/// Errors raised while building or driving the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    /// A test-only operation was attempted where it is not allowed.
    #[error("{operation} is not permitted in the {environment} environment")]
    NotPermitted {
        operation: &'static str,
        environment: Environment,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// The collaborators a runtime is built over.
pub struct Collaborators<C, A, K> {
    pub contexts: Arc<C>,
    pub assignments: Arc<A>,
    pub kv: Arc<K>,
}

impl<C, A, K> Clone for Collaborators<C, A, K> {
    fn clone(&self) -> Self {
        Self {
            contexts: Arc::clone(&self.contexts),
            assignments: Arc::clone(&self.assignments),
            kv: Arc::clone(&self.kv),
        }
    }
}

pub type MemoryCollaborators =
    Collaborators<MemoryContextStore, MemoryAssignmentStore, MemoryKeyValueStore>;

impl MemoryCollaborators {
    /// Empty in-memory stores holding only the root context.
    pub fn memory() -> Self {
        Self {
            contexts: MemoryContextStore::new_shared(),
            assignments: MemoryAssignmentStore::new_shared(),
            kv: MemoryKeyValueStore::new_shared(),
        }
    }
}

/// Shared state of one scopeacl deployment.
pub struct AclRuntime<C, A, K> {
    config: Arc<ServerConfig>,
    stores: Collaborators<C, A, K>,
    service: Arc<AccessControlService<C, A, K>>,
    ops: CacheOps<C, A, K>,
}

pub type MemoryRuntime = AclRuntime<MemoryContextStore, MemoryAssignmentStore, MemoryKeyValueStore>;

impl<C, A, K> Clone for AclRuntime<C, A, K> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            stores: self.stores.clone(),
            service: Arc::clone(&self.service),
            ops: self.ops.clone(),
        }
    }
}

impl MemoryRuntime {
    /// Builds a runtime over the backend named in `config.storage.backend`.
    pub fn from_config(
        config: ServerConfig,
        parents: ParentRegistry,
        policies: PolicyRegistry,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        match config.storage.backend.as_str() {
            "memory" => Self::with_stores(config, MemoryCollaborators::memory(), parents, policies),
            other => Err(ConfigLoadError::Invalid {
                message: format!("unsupported storage backend: {other}"),
            }
            .into()),
        }
    }
}

impl<C, A, K> AclRuntime<C, A, K>
where
    C: ContextStore,
    A: AssignmentReader,
    K: KeyValueStore,
{
    /// Builds a runtime over caller-supplied stores.
    pub fn with_stores(
        config: ServerConfig,
        stores: Collaborators<C, A, K>,
        parents: ParentRegistry,
        policies: PolicyRegistry,
    ) -> RuntimeResult<Self> {
        config.validate()?;

        let service = Arc::new(
            AccessControlService::builder(
                Arc::clone(&stores.contexts),
                Arc::clone(&stores.assignments),
                Arc::clone(&stores.kv),
            )
            .parents(parents)
            .policies(policies)
            .config(config.service_config())
            .build(),
        );
        let ops = CacheOps::new(Arc::clone(&service), CacheOpsConfig::from(&config.metrics));

        info!(
            environment = %config.environment,
            backend = %config.storage.backend,
            shared_memory = config.cache.shared_memory_enabled,
            persistent_ttl_secs = config.cache.persistent_ttl_secs,
            "scopeacl runtime ready"
        );

        Ok(Self {
            config: Arc::new(config),
            stores,
            service,
            ops,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn stores(&self) -> &Collaborators<C, A, K> {
        &self.stores
    }

    pub fn service(&self) -> &Arc<AccessControlService<C, A, K>> {
        &self.service
    }

    pub fn ops(&self) -> &CacheOps<C, A, K> {
        &self.ops
    }

    /// Opens a unit of work.
    pub fn session(&self) -> AccessSession<'_, C, A, K> {
        self.service.session()
    }

    /// Makes `user` a super-admin for `session` and every later unit of work
    /// until the user is invalidated.
    ///
    /// Refused in production.
    #[cfg(feature = "test-support")]
    pub async fn act_as_super_admin(
        &self,
        session: &AccessSession<'_, C, A, K>,
        user: scopeacl_storage::UserId,
    ) -> RuntimeResult<()> {
        let environment = self.config.environment;
        if environment.is_production() {
            return Err(RuntimeError::NotPermitted {
                operation: "act_as_super_admin",
                environment,
            });
        }

        warn!(user_id = user, %environment, "seeding synthetic super-admin snapshot");
        session.act_as_super_admin(user).await?;
        Ok(())
    }
}

impl<C, A, K> AclRuntime<C, A, K>
where
    C: ContextStore + 'static,
    A: AssignmentReader + 'static,
    K: KeyValueStore + 'static,
{
    /// Spawns a task persisting the cache counters every `period`.
    ///
    /// Does nothing useful when metrics persistence is disabled; the task
    /// exits immediately in that case. Abort the handle to stop it.
    pub fn spawn_metrics_flush(&self, period: Duration) -> JoinHandle<()> {
        let ops = self.ops.clone();
        tokio::spawn(async move {
            if !ops.config().metrics_enabled {
                return;
            }

            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) = ops.persist_metrics().await {
                    warn!(%error, "failed to persist cache metrics");
                }
            }
        })
    }
}
