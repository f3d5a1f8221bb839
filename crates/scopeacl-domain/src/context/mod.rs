//! Authorization contexts and their materialized-path hierarchy.
//!
//! A [`Context`] is a node in the scope tree (`system -> course -> page`).
//! Every node carries its full ancestor chain as a materialized path such as
//! `1/5/12/`, so hierarchy checks never need recursive queries.
//!
//! Contexts are immutable: the only way to obtain one is [`Context::root`],
//! [`Context::from_record`] (which validates the path against the record's
//! own id, parent and depth) or the [`ContextResolver`]. A corrupted path is
//! rejected up front instead of silently producing a wrong ancestor chain.

mod parent;
mod resolver;
mod subject;

#[cfg(test)]
mod path_proptest;

pub use parent::{ParentAccessor, ParentRegistry};
pub use resolver::{ContextResolver, DEFAULT_MAX_DEPTH};
pub use subject::{AsAny, DomainObject, HasParentContext, Subject, SubjectType};

use scopeacl_storage::{ContextId, ContextRecord, ROOT_CONTEXT_ID};

use crate::error::{DomainError, DomainResult};

/// A validated node of the context tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context {
    id: ContextId,
    parent_id: Option<ContextId>,
    level: String,
    instance_id: Option<i64>,
    depth: u32,
    path: String,
    /// Parsed path, root first, ending with `id`.
    ancestors: Vec<ContextId>,
}

impl Context {
    /// The root ("system") context.
    pub fn root() -> Self {
        let record = ContextRecord::root();
        Self {
            id: record.id,
            parent_id: None,
            level: record.level,
            instance_id: None,
            depth: 0,
            path: record.path,
            ancestors: vec![ROOT_CONTEXT_ID],
        }
    }

    /// Builds a context from a stored record, enforcing the path invariant:
    ///
    /// - the path parses as `/`-terminated integer ids starting at the root,
    /// - the last id is the record's own id,
    /// - the second-to-last id is the parent id (none for the root),
    /// - there are exactly `depth + 1` ids.
    pub fn from_record(record: ContextRecord) -> DomainResult<Self> {
        let corrupt = || DomainError::CorruptContextPath {
            context_id: record.id,
            path: record.path.clone(),
        };

        let ancestors = parse_path(&record.path).ok_or_else(corrupt)?;

        let (own_id, parents) = ancestors.split_last().ok_or_else(corrupt)?;
        if *own_id != record.id
            || ancestors[0] != ROOT_CONTEXT_ID
            || parents.last().copied() != record.parent_id
            || ancestors.len() != record.depth as usize + 1
        {
            return Err(corrupt());
        }

        Ok(Self {
            id: record.id,
            parent_id: record.parent_id,
            level: record.level,
            instance_id: record.instance_id,
            depth: record.depth,
            path: record.path,
            ancestors,
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn parent_id(&self) -> Option<ContextId> {
        self.parent_id
    }

    /// Level tag of the owning domain type (e.g. `"course"`).
    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn instance_id(&self) -> Option<i64> {
        self.instance_id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Materialized path, e.g. `1/5/12/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Ancestor ids in root-to-self order, including this context's own id.
    pub fn ancestor_ids(&self) -> &[ContextId] {
        &self.ancestors
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_CONTEXT_ID
    }

    /// Returns true if `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &Context) -> bool {
        other.ancestors.contains(&self.id)
    }
}

/// Parses `1/5/12/` into `[1, 5, 12]`.
///
/// Returns `None` for an empty path, a missing trailing slash, empty segments
/// or non-numeric segments.
fn parse_path(path: &str) -> Option<Vec<ContextId>> {
    let body = path.strip_suffix('/')?;
    if body.is_empty() {
        return None;
    }
    body.split('/')
        .map(|segment| segment.parse::<ContextId>().ok())
        .collect()
}
