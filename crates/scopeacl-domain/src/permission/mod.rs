//! Permission snapshots and their bulk loader.

mod snapshot;

pub use snapshot::{ContextGrants, PermissionSnapshot};

use std::sync::Arc;

use scopeacl_storage::{AssignmentReader, UserId};
use tracing::debug;

use crate::error::DomainResult;

/// Builds [`PermissionSnapshot`]s from the bulk assignment read.
///
/// One collaborator round-trip per load, never one query per context.
pub struct PermissionLoader<A> {
    reader: Arc<A>,
}

impl<A> PermissionLoader<A>
where
    A: AssignmentReader,
{
    pub fn new(reader: Arc<A>) -> Self {
        Self { reader }
    }

    /// Loads the complete snapshot of `user_id`.
    ///
    /// Returns an empty snapshot when the user holds no roles.
    pub async fn load_snapshot(&self, user_id: UserId) -> DomainResult<PermissionSnapshot> {
        let rows = self.reader.load_assignments(user_id).await?;
        let assignment_count = rows.len();
        let snapshot = PermissionSnapshot::from_assignments(rows);

        metrics::counter!("scopeacl_snapshot_loads_total").increment(1);
        debug!(
            user_id,
            assignment_count,
            context_count = snapshot.contexts().count(),
            "loaded permission snapshot"
        );
        Ok(snapshot)
    }
}

impl<A> Clone for PermissionLoader<A> {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
        }
    }
}
