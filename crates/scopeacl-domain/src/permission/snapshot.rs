//! The cached per-user view of roles and permissions.

use std::collections::{BTreeMap, BTreeSet};

use scopeacl_storage::{AssignmentRow, ContextId, RoleId};
use serde::{Deserialize, Serialize};

use crate::error::DomainResult;

/// Roles and permissions a user holds at one context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextGrants {
    /// role id -> role name
    pub roles: BTreeMap<RoleId, String>,
    /// Union of the permissions of every role held here.
    pub permissions: BTreeSet<String>,
}

impl ContextGrants {
    pub fn has_role(&self, role_name: &str) -> bool {
        self.roles.values().any(|name| name == role_name)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Every role and permission of one user, keyed by context id.
///
/// Cached as a unit and invalidated wholesale. An empty snapshot (user has no
/// assignments) is a valid, cacheable value.
///
/// Ordered maps keep the serialized form deterministic: two loads of the same
/// storage state encode to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    contexts: BTreeMap<ContextId, ContextGrants>,
}

impl PermissionSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregates bulk assignment rows into a snapshot.
    pub fn from_assignments(rows: impl IntoIterator<Item = AssignmentRow>) -> Self {
        let mut snapshot = Self::new();
        for row in rows {
            snapshot.grant(row.context_id, row.role_id, row.role_name, row.permission_names);
        }
        snapshot
    }

    /// Records that the user holds `role_name` with `permissions` at
    /// `context_id`.
    pub fn grant<I, S>(
        &mut self,
        context_id: ContextId,
        role_id: RoleId,
        role_name: impl Into<String>,
        permissions: I,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let grants = self.contexts.entry(context_id).or_default();
        grants.roles.insert(role_id, role_name.into());
        grants
            .permissions
            .extend(permissions.into_iter().map(Into::into));
    }

    pub fn context(&self, context_id: ContextId) -> Option<&ContextGrants> {
        self.contexts.get(&context_id)
    }

    pub fn contexts(&self) -> impl Iterator<Item = (ContextId, &ContextGrants)> {
        self.contexts.iter().map(|(id, grants)| (*id, grants))
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Returns the first context of `ancestors` (in the given order) where
    /// `permission` is granted.
    pub fn find_permission(&self, ancestors: &[ContextId], permission: &str) -> Option<ContextId> {
        ancestors.iter().copied().find(|id| {
            self.context(*id)
                .is_some_and(|grants| grants.has_permission(permission))
        })
    }

    /// Returns the first context of `ancestors` (in the given order) where a
    /// role named `role_name` is held.
    pub fn find_role(&self, ancestors: &[ContextId], role_name: &str) -> Option<ContextId> {
        ancestors.iter().copied().find(|id| {
            self.context(*id)
                .is_some_and(|grants| grants.has_role(role_name))
        })
    }

    /// Encodes the snapshot for the persistent cache tier.
    pub fn to_bytes(&self) -> DomainResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a snapshot read from the persistent cache tier.
    pub fn from_bytes(bytes: &[u8]) -> DomainResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_row(context_id: ContextId) -> AssignmentRow {
        AssignmentRow {
            role_id: 9,
            role_name: "editor".to_string(),
            context_id,
            permission_names: vec!["edit:page".to_string(), "view:page".to_string()],
        }
    }

    #[test]
    fn test_from_assignments_groups_by_context() {
        let snapshot = PermissionSnapshot::from_assignments(vec![
            editor_row(5),
            AssignmentRow {
                role_id: 3,
                role_name: "student".to_string(),
                context_id: 8,
                permission_names: vec!["view:page".to_string()],
            },
        ]);

        let at_5 = snapshot.context(5).unwrap();
        assert_eq!(at_5.roles.get(&9).map(String::as_str), Some("editor"));
        assert!(at_5.has_permission("edit:page"));
        assert!(snapshot.context(8).unwrap().has_role("student"));
        assert!(snapshot.context(1).is_none());
    }

    #[test]
    fn test_multiple_roles_at_one_context_merge_permissions() {
        let mut snapshot = PermissionSnapshot::new();
        snapshot.grant(5, 9, "editor", ["edit:page"]);
        snapshot.grant(5, 10, "grader", ["grade:quiz"]);

        let grants = snapshot.context(5).unwrap();
        assert_eq!(grants.roles.len(), 2);
        assert!(grants.has_permission("edit:page"));
        assert!(grants.has_permission("grade:quiz"));
    }

    #[test]
    fn test_find_permission_returns_first_match_in_order() {
        let mut snapshot = PermissionSnapshot::new();
        snapshot.grant(1, 2, "manager", ["edit:page"]);
        snapshot.grant(5, 9, "editor", ["edit:page"]);

        assert_eq!(snapshot.find_permission(&[1, 5, 12], "edit:page"), Some(1));
        assert_eq!(snapshot.find_permission(&[5, 12], "edit:page"), Some(5));
        assert_eq!(snapshot.find_permission(&[12], "edit:page"), None);
    }

    #[test]
    fn test_find_role_matches_by_name() {
        let snapshot = PermissionSnapshot::from_assignments(vec![editor_row(5)]);

        assert_eq!(snapshot.find_role(&[1, 5], "editor"), Some(5));
        assert_eq!(snapshot.find_role(&[1, 5], "student"), None);
    }

    #[test]
    fn test_bytes_round_trip_preserves_empty_snapshot() {
        let empty = PermissionSnapshot::new();

        let decoded = PermissionSnapshot::from_bytes(&empty.to_bytes().unwrap()).unwrap();

        assert!(decoded.is_empty());
        assert_eq!(decoded, empty);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = PermissionSnapshot::from_assignments(vec![editor_row(8), editor_row(5)]);
        let b = PermissionSnapshot::from_assignments(vec![editor_row(5), editor_row(8)]);

        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let err = PermissionSnapshot::from_bytes(b"not json").unwrap_err();

        assert!(matches!(err, crate::error::DomainError::Serialization { .. }));
    }
}
