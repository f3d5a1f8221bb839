//! Resolution of subjects to context nodes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use scopeacl_storage::{ContextStore, NewContext, StorageError, ROOT_CONTEXT_ID};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{DomainError, DomainResult};

use super::parent::ParentRegistry;
use super::subject::{DomainObject, Subject};
use super::Context;

/// Default bound on the parent chain length of a domain object.
pub const DEFAULT_MAX_DEPTH: u32 = 25;

/// Type alias for boxed future to handle async recursion.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves subjects to [`Context`] nodes, creating missing nodes lazily.
///
/// Contexts for domain objects are created the first time the object needs
/// authorization scoping: the object's declared parent is resolved first
/// (recursively), then the new node is inserted below it with
/// `depth = parent.depth + 1` and `path = parent.path + id + "/"`.
pub struct ContextResolver<C> {
    store: Arc<C>,
    parents: Arc<ParentRegistry>,
    max_depth: u32,
    /// The root never changes once it exists.
    root: OnceCell<Context>,
}

impl<C> ContextResolver<C>
where
    C: ContextStore,
{
    /// Creates a resolver over `store` using the startup-built `parents`.
    pub fn new(store: Arc<C>, parents: Arc<ParentRegistry>) -> Self {
        Self {
            store,
            parents,
            max_depth: DEFAULT_MAX_DEPTH,
            root: OnceCell::new(),
        }
    }

    /// Sets the maximum parent chain length followed during creation.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn parents(&self) -> &ParentRegistry {
        &self.parents
    }

    /// Returns the root context.
    ///
    /// A missing root is a deployment error and is reported as
    /// [`DomainError::Configuration`].
    pub async fn root(&self) -> DomainResult<Context> {
        self.root
            .get_or_try_init(|| async {
                let record = self
                    .store
                    .get_context(ROOT_CONTEXT_ID)
                    .await?
                    .ok_or_else(|| DomainError::Configuration {
                        message: format!("root context {ROOT_CONTEXT_ID} does not exist"),
                    })?;
                Context::from_record(record)
            })
            .await
            .cloned()
    }

    /// Resolves a subject to its context.
    ///
    /// - `Root` and `Type` subjects resolve to the root context.
    /// - `Context` subjects are returned as-is.
    /// - `Object` subjects are looked up by `(level, instance_id)` and created
    ///   below their declared parent when absent.
    pub async fn resolve(&self, subject: Subject<'_>) -> DomainResult<Context> {
        match subject {
            Subject::Context(context) => Ok(context.clone()),
            Subject::Root | Subject::Type(_) => self.root().await,
            Subject::Object(object) => self.resolve_object(object, 0).await,
        }
    }

    /// Looks up an existing context by identifiers only.
    ///
    /// Never creates: without the object its parent cannot be inferred.
    pub async fn resolve_by_level_and_id(
        &self,
        level: &str,
        instance_id: i64,
    ) -> DomainResult<Context> {
        match self.store.find_context(level, instance_id).await? {
            Some(record) => Context::from_record(record),
            None => Err(DomainError::ContextNotFound {
                level: level.to_string(),
                instance_id,
            }),
        }
    }

    fn resolve_object<'a>(
        &'a self,
        object: &'a dyn DomainObject,
        depth: u32,
    ) -> BoxFuture<'a, DomainResult<Context>> {
        Box::pin(async move {
            if depth > self.max_depth {
                return Err(DomainError::DepthLimitExceeded {
                    max_depth: self.max_depth,
                });
            }

            let level = object.level();
            let instance_id = object.instance_id();
            if let Some(record) = self.store.find_context(level, instance_id).await? {
                return Context::from_record(record);
            }

            let parent = match self.parents.parent_of(object) {
                Some(parent_object) => self.resolve_object(&*parent_object, depth + 1).await?,
                None => self.root().await?,
            };

            self.create_child(&parent, level, instance_id).await
        })
    }

    async fn create_child(
        &self,
        parent: &Context,
        level: &str,
        instance_id: i64,
    ) -> DomainResult<Context> {
        let new_context = NewContext {
            parent_id: parent.id(),
            level: level.to_string(),
            instance_id,
            depth: parent.depth() + 1,
            parent_path: parent.path().to_string(),
        };

        let record = match self.store.create_context(new_context).await {
            Ok(record) => record,
            // Another unit of work created it first; its row is authoritative
            Err(StorageError::ContextConflict { .. }) => self
                .store
                .find_context(level, instance_id)
                .await?
                .ok_or_else(|| DomainError::ContextNotFound {
                    level: level.to_string(),
                    instance_id,
                })?,
            Err(err) => return Err(err.into()),
        };

        let context = Context::from_record(record)?;
        if context.parent_id() != Some(parent.id()) {
            return Err(DomainError::CorruptContextPath {
                context_id: context.id(),
                path: context.path().to_string(),
            });
        }

        debug!(
            context_id = context.id(),
            level,
            instance_id,
            path = context.path(),
            "created context"
        );
        Ok(context)
    }
}
