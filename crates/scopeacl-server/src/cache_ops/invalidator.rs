//! Invalidation of cached permission snapshots.
//!
//! Callers that change roles or permissions must invalidate the affected
//! users after the change is committed.

use scopeacl_domain::DomainResult;
use scopeacl_storage::{AssignmentReader, ContextStore, KeyValueStore, UserId};
use tracing::{info, warn};

use super::CacheOps;

impl<C, A, K> CacheOps<C, A, K>
where
    C: ContextStore,
    A: AssignmentReader,
    K: KeyValueStore,
{
    /// Clears the shared-memory and persistent entries of `user`.
    pub async fn invalidate_all_levels(&self, user: UserId) -> DomainResult<()> {
        self.service.cache().invalidate_shared(user).await?;
        info!(user_id = user, "invalidated permission snapshot");
        Ok(())
    }

    /// Invalidates every user in `users`, returning how many were cleared.
    ///
    /// Every user is attempted even if an earlier one fails; the first
    /// failure is returned after the loop.
    pub async fn invalidate_batch(&self, users: &[UserId]) -> DomainResult<usize> {
        let mut invalidated = 0;
        let mut first_error = None;

        for &user in users {
            match self.invalidate_all_levels(user).await {
                Ok(()) => invalidated += 1,
                Err(error) => {
                    warn!(user_id = user, %error, "failed to invalidate permission snapshot");
                    first_error.get_or_insert(error);
                }
            }
        }

        info!(
            requested = users.len(),
            invalidated, "batch invalidation finished"
        );
        match first_error {
            Some(error) => Err(error),
            None => Ok(invalidated),
        }
    }
}
