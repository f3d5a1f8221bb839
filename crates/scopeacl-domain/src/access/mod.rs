//! Ability checks: policy dispatch, super-admin and the hierarchy walk.
//!
//! [`AccessControlService`] is built once at startup and shared. Every unit
//! of work (one request, one job) opens an [`AccessSession`], which owns the
//! request-local cache tier and is dropped when the unit of work ends:
//!
//! ```rust,ignore
//! let session = service.session();
//! if session.check(user_id, "edit:page", Subject::object(&page)).await? {
//!     // ...
//! }
//! ```
//!
//! `check` decides in this order, first decisive result wins:
//!
//! 1. the policy registered for the subject's type,
//! 2. the `super-admin` role held at the root context,
//! 3. the permission granted at any context on the subject's ancestor chain.

mod config;

#[cfg(test)]
mod tests;

pub use config::ServiceConfig;

use std::sync::Arc;

use scopeacl_storage::{
    AssignmentReader, ContextStore, KeyValueStore, UserId, ROOT_CONTEXT_ID,
};
use tracing::{debug, trace};

use crate::cache::{RequestCache, TieredCache};
use crate::context::{Context, ContextResolver, ParentRegistry, Subject};
use crate::error::{DomainError, DomainResult};
use crate::permission::{PermissionLoader, PermissionSnapshot};
use crate::policy::{AbilityResponse, PolicyRegistry};

/// Role that satisfies every ability when held at the root context.
pub const SUPER_ADMIN_ROLE: &str = "super-admin";

/// Process-wide entry point for authorization decisions.
pub struct AccessControlService<C, A, K> {
    resolver: ContextResolver<C>,
    loader: PermissionLoader<A>,
    cache: Arc<TieredCache<K>>,
    policies: Arc<PolicyRegistry>,
}

impl<C, A, K> AccessControlService<C, A, K>
where
    C: ContextStore,
    A: AssignmentReader,
    K: KeyValueStore,
{
    /// Creates a service with default configuration and empty registries.
    pub fn new(contexts: Arc<C>, assignments: Arc<A>, kv: Arc<K>) -> Self {
        Self::builder(contexts, assignments, kv).build()
    }

    pub fn builder(
        contexts: Arc<C>,
        assignments: Arc<A>,
        kv: Arc<K>,
    ) -> AccessControlServiceBuilder<C, A, K> {
        AccessControlServiceBuilder {
            contexts,
            assignments,
            kv,
            parents: ParentRegistry::new(),
            policies: PolicyRegistry::new(),
            config: ServiceConfig::default(),
        }
    }

    /// Starts a unit of work with an empty request-local cache.
    pub fn session(&self) -> AccessSession<'_, C, A, K> {
        AccessSession {
            service: self,
            local: RequestCache::new(),
        }
    }

    pub fn resolver(&self) -> &ContextResolver<C> {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<TieredCache<K>> {
        &self.cache
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }
}

/// Builder for [`AccessControlService`].
pub struct AccessControlServiceBuilder<C, A, K> {
    contexts: Arc<C>,
    assignments: Arc<A>,
    kv: Arc<K>,
    parents: ParentRegistry,
    policies: PolicyRegistry,
    config: ServiceConfig,
}

impl<C, A, K> AccessControlServiceBuilder<C, A, K>
where
    C: ContextStore,
    A: AssignmentReader,
    K: KeyValueStore,
{
    /// Sets the declared parent accessors of domain types.
    pub fn parents(mut self, parents: ParentRegistry) -> Self {
        self.parents = parents;
        self
    }

    pub fn policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> AccessControlService<C, A, K> {
        debug!(
            parent_types = self.parents.len(),
            policy_types = self.policies.len(),
            shared_memory = self.config.cache.shared_enabled,
            "building access control service"
        );

        AccessControlService {
            resolver: ContextResolver::new(self.contexts, Arc::new(self.parents))
                .with_max_depth(self.config.max_context_depth),
            loader: PermissionLoader::new(self.assignments),
            cache: Arc::new(TieredCache::new(self.kv, self.config.cache)),
            policies: Arc::new(self.policies),
        }
    }
}

/// One unit of work against an [`AccessControlService`].
///
/// Holds Tier 1 of the cache. A session must not outlive its unit of work:
/// snapshots it has read stay visible to it even after another unit of work
/// invalidates the user.
pub struct AccessSession<'s, C, A, K> {
    service: &'s AccessControlService<C, A, K>,
    local: RequestCache,
}

impl<C, A, K> AccessSession<'_, C, A, K>
where
    C: ContextStore,
    A: AssignmentReader,
    K: KeyValueStore,
{
    /// Decides whether `user` may perform `ability` on `subject`.
    ///
    /// # Errors
    ///
    /// - [`DomainError::AuthorizationDenied`] when a policy denies with a
    ///   reason. A plain policy or hierarchy denial is `Ok(false)`.
    /// - Context resolution and storage errors propagate.
    pub async fn check(
        &self,
        user: UserId,
        ability: &str,
        subject: Subject<'_>,
    ) -> DomainResult<bool> {
        match self.service.policies.evaluate(user, ability, &subject) {
            Some(AbilityResponse::Allow) => {
                trace!(user, ability, "allowed by policy");
                return Ok(true);
            }
            Some(AbilityResponse::Deny) => {
                trace!(user, ability, "denied by policy");
                return Ok(false);
            }
            Some(AbilityResponse::DenyWithReason(reason)) => {
                return Err(DomainError::AuthorizationDenied {
                    ability: ability.to_string(),
                    reason: Some(reason),
                });
            }
            None => {}
        }

        let snapshot = self.snapshot(user).await?;
        if is_super_admin(&snapshot) {
            trace!(user, ability, "allowed as super-admin");
            return Ok(true);
        }

        let context = self.service.resolver.resolve(subject).await?;
        let granted_at = snapshot.find_permission(context.ancestor_ids(), ability);
        trace!(user, ability, context_id = context.id(), ?granted_at, "hierarchy walk");
        Ok(granted_at.is_some())
    }

    /// Like [`check`](Self::check), but a denial of any kind is an error.
    ///
    /// Hierarchy denials carry no reason.
    pub async fn authorize(
        &self,
        user: UserId,
        ability: &str,
        subject: Subject<'_>,
    ) -> DomainResult<()> {
        if self.check(user, ability, subject).await? {
            Ok(())
        } else {
            Err(DomainError::AuthorizationDenied {
                ability: ability.to_string(),
                reason: None,
            })
        }
    }

    /// Returns true if `user` holds a role named `role_name` at the subject's
    /// context or any of its ancestors.
    ///
    /// Policies and super-admin status are not consulted.
    pub async fn has_role(
        &self,
        user: UserId,
        role_name: &str,
        subject: Subject<'_>,
    ) -> DomainResult<bool> {
        let context: Context = self.service.resolver.resolve(subject).await?;
        let snapshot = self.snapshot(user).await?;
        Ok(snapshot
            .find_role(context.ancestor_ids(), role_name)
            .is_some())
    }

    /// Returns true if `user` holds `super-admin` at the root context itself.
    pub async fn is_super_admin(&self, user: UserId) -> DomainResult<bool> {
        Ok(is_super_admin(&*self.snapshot(user).await?))
    }

    /// Returns the user's snapshot, loading and caching it on a full miss.
    pub async fn snapshot(&self, user: UserId) -> DomainResult<Arc<PermissionSnapshot>> {
        let cache = &self.service.cache;
        if let Some(snapshot) = cache.get(&self.local, user).await? {
            return Ok(snapshot);
        }

        let snapshot = self.service.loader.load_snapshot(user).await?;
        cache
            .put(&self.local, user, snapshot, cache.config().persistent_ttl)
            .await
    }

    /// Drops `user` from this session and from the shared tiers.
    pub async fn invalidate(&self, user: UserId) -> DomainResult<()> {
        self.service.cache.invalidate(&self.local, user).await
    }

    /// Seeds every cache tier with a synthetic snapshot making `user` a
    /// super-admin, bypassing storage.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn act_as_super_admin(&self, user: UserId) -> DomainResult<()> {
        let mut snapshot = PermissionSnapshot::new();
        snapshot.grant(
            ROOT_CONTEXT_ID,
            0,
            SUPER_ADMIN_ROLE,
            std::iter::empty::<String>(),
        );

        let cache = &self.service.cache;
        cache
            .put(&self.local, user, snapshot, cache.config().persistent_ttl)
            .await?;
        Ok(())
    }
}

fn is_super_admin(snapshot: &PermissionSnapshot) -> bool {
    snapshot
        .context(ROOT_CONTEXT_ID)
        .is_some_and(|grants| grants.has_role(SUPER_ADMIN_ROLE))
}
