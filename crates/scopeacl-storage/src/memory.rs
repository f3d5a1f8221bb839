//! In-memory collaborator implementations.
//!
//! Used by tests and by single-node deployments that configure the `memory`
//! backend. All three stores are backed by `DashMap` for lock-free concurrent
//! access from many units of work.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    AssignmentReader, AssignmentRow, ContextId, ContextRecord, ContextStore, KeyValueStore,
    NewContext, RoleId, UserId, ROOT_CONTEXT_ID,
};

/// In-memory implementation of [`ContextStore`].
///
/// # Performance Characteristics
///
/// - **Get by id**: O(1) (DashMap lookup)
/// - **Find by (level, instance_id)**: O(1) via a secondary index
/// - **Create**: O(1), id assigned from an atomic sequence
#[derive(Debug)]
pub struct MemoryContextStore {
    contexts: DashMap<ContextId, ContextRecord>,
    /// Secondary index: (level, instance_id) -> context id.
    by_owner: DashMap<(String, i64), ContextId>,
    next_id: AtomicI64,
}

impl MemoryContextStore {
    /// Creates a store holding only the root context.
    pub fn new() -> Self {
        let contexts = DashMap::new();
        contexts.insert(ROOT_CONTEXT_ID, ContextRecord::root());
        Self {
            contexts,
            by_owner: DashMap::new(),
            next_id: AtomicI64::new(ROOT_CONTEXT_ID + 1),
        }
    }

    /// Creates a store with no contexts at all, not even the root.
    ///
    /// Only useful to exercise the missing-root configuration error.
    pub fn without_root() -> Self {
        Self {
            contexts: DashMap::new(),
            by_owner: DashMap::new(),
            next_id: AtomicI64::new(ROOT_CONTEXT_ID + 1),
        }
    }

    /// Creates a new store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Inserts a record verbatim, bypassing id assignment.
    ///
    /// Intended for seeding fixtures with well-known ids. The id sequence is
    /// advanced past the inserted id.
    pub fn insert_record(&self, record: ContextRecord) {
        if let Some(instance_id) = record.instance_id {
            self.by_owner
                .insert((record.level.clone(), instance_id), record.id);
        }
        self.next_id.fetch_max(record.id + 1, Ordering::SeqCst);
        self.contexts.insert(record.id, record);
    }

    /// Returns the number of stored contexts, root included.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns true if no context is stored.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl Default for MemoryContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn get_context(&self, id: ContextId) -> StorageResult<Option<ContextRecord>> {
        Ok(self.contexts.get(&id).map(|c| c.value().clone()))
    }

    async fn find_context(
        &self,
        level: &str,
        instance_id: i64,
    ) -> StorageResult<Option<ContextRecord>> {
        let id = match self.by_owner.get(&(level.to_string(), instance_id)) {
            Some(id) => *id.value(),
            None => return Ok(None),
        };
        Ok(self.contexts.get(&id).map(|c| c.value().clone()))
    }

    #[instrument(skip(self, context), fields(level = %context.level, instance_id = context.instance_id))]
    async fn create_context(&self, context: NewContext) -> StorageResult<ContextRecord> {
        if context.level.trim().is_empty() {
            return Err(StorageError::InvalidInput {
                message: "context level cannot be empty".to_string(),
            });
        }
        if !self.contexts.contains_key(&context.parent_id) {
            return Err(StorageError::ParentNotFound {
                parent_id: context.parent_id,
            });
        }

        // Use atomic entry API so two racing creators cannot both insert.
        // The record is stored before the index entry is published, so a
        // concurrent `find_context` never sees an id without its record.
        use dashmap::mapref::entry::Entry;
        let owner_key = (context.level.clone(), context.instance_id);
        match self.by_owner.entry(owner_key) {
            Entry::Occupied(_) => Err(StorageError::ContextConflict {
                level: context.level,
                instance_id: Some(context.instance_id),
            }),
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let record = ContextRecord {
                    id,
                    parent_id: Some(context.parent_id),
                    path: context.path_for(id),
                    level: context.level,
                    instance_id: Some(context.instance_id),
                    depth: context.depth,
                };
                self.contexts.insert(id, record.clone());
                entry.insert(id);
                Ok(record)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct RoleRecord {
    name: String,
    permissions: BTreeSet<String>,
}

/// In-memory role, permission and assignment storage.
///
/// Implements [`AssignmentReader`] with a single pass over the user's
/// assignments, joining roles and permissions in memory.
#[derive(Debug, Default)]
pub struct MemoryAssignmentStore {
    roles: DashMap<RoleId, RoleRecord>,
    /// user id -> (role id, context id) pairs.
    assignments: DashMap<UserId, Vec<(RoleId, ContextId)>>,
}

impl MemoryAssignmentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Creates or renames a role.
    pub fn upsert_role(&self, role_id: RoleId, name: &str) {
        self.roles
            .entry(role_id)
            .and_modify(|r| r.name = name.to_string())
            .or_insert_with(|| RoleRecord {
                name: name.to_string(),
                permissions: BTreeSet::new(),
            });
    }

    /// Attaches a permission to a role.
    pub fn grant_permission(&self, role_id: RoleId, permission: &str) -> StorageResult<()> {
        let mut role = self
            .roles
            .get_mut(&role_id)
            .ok_or(StorageError::RoleNotFound { role_id })?;
        role.permissions.insert(permission.to_string());
        Ok(())
    }

    /// Detaches a permission from a role.
    pub fn revoke_permission(&self, role_id: RoleId, permission: &str) -> StorageResult<()> {
        let mut role = self
            .roles
            .get_mut(&role_id)
            .ok_or(StorageError::RoleNotFound { role_id })?;
        role.permissions.remove(permission);
        Ok(())
    }

    /// Assigns a role to a user at a context.
    pub fn assign_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        context_id: ContextId,
    ) -> StorageResult<()> {
        if !self.roles.contains_key(&role_id) {
            return Err(StorageError::RoleNotFound { role_id });
        }
        let mut held = self.assignments.entry(user_id).or_default();
        if !held.contains(&(role_id, context_id)) {
            held.push((role_id, context_id));
        }
        Ok(())
    }

    /// Removes a role assignment. Removing a missing assignment is a no-op.
    pub fn revoke_role(&self, user_id: UserId, role_id: RoleId, context_id: ContextId) {
        if let Some(mut held) = self.assignments.get_mut(&user_id) {
            held.retain(|a| *a != (role_id, context_id));
        }
    }

    /// Returns the users holding `role_id` anywhere.
    ///
    /// Callers use this to find whose snapshots to invalidate after changing a
    /// role's permissions.
    pub fn users_with_role(&self, role_id: RoleId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .assignments
            .iter()
            .filter(|entry| entry.value().iter().any(|(r, _)| *r == role_id))
            .map(|entry| *entry.key())
            .collect();
        users.sort_unstable();
        users
    }
}

#[async_trait]
impl AssignmentReader for MemoryAssignmentStore {
    async fn load_assignments(&self, user_id: UserId) -> StorageResult<Vec<AssignmentRow>> {
        // Copy the pairs out first so no assignments shard stays locked while
        // the roles map is read.
        let held = match self.assignments.get(&user_id) {
            Some(held) => held.value().clone(),
            None => return Ok(Vec::new()),
        };

        let mut rows = Vec::with_capacity(held.len());
        for (role_id, context_id) in held {
            let role = self
                .roles
                .get(&role_id)
                .ok_or(StorageError::RoleNotFound { role_id })?;
            rows.push(AssignmentRow {
                role_id,
                role_name: role.name.clone(),
                context_id,
                permission_names: role.permissions.iter().cloned().collect(),
            });
        }
        Ok(rows)
    }
}

#[derive(Debug, Clone)]
struct KvEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory [`KeyValueStore`] with per-entry expiry.
///
/// Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: DashMap<String, KvEntry>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns true if `key` holds a live value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.expires_at > Instant::now())
    }

    /// Returns the remaining time-to-live of `key`, if present.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .and_then(|e| e.expires_at.checked_duration_since(Instant::now()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        // Expired: remove only if nobody refreshed it in between
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        let expires_at =
            Instant::now()
                .checked_add(ttl)
                .ok_or_else(|| StorageError::InvalidInput {
                    message: format!("ttl of {}s is out of range", ttl.as_secs()),
                })?;
        self.entries
            .insert(key.to_string(), KvEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
