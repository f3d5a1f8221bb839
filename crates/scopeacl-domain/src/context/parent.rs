//! Registry of declared parent accessors, built once at startup.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::subject::{type_id_of, DomainObject, HasParentContext};

/// Type-erased parent accessor for one registered type.
pub type ParentAccessor = fn(&dyn Any) -> Option<Arc<dyn DomainObject>>;

/// Maps domain types to their [`HasParentContext`] accessor.
///
/// Built with [`ParentRegistry::register`] during startup and shared
/// read-only (behind an `Arc`) by every resolver afterwards.
///
/// # Example
///
/// ```rust,ignore
/// let parents = ParentRegistry::new()
///     .register::<Course>()
///     .register::<Page>();
/// ```
#[derive(Clone, Default)]
pub struct ParentRegistry {
    accessors: HashMap<TypeId, (&'static str, ParentAccessor)>,
}

impl ParentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `T` places its context below the object returned by
    /// [`HasParentContext::parent_context`].
    pub fn register<T: HasParentContext + 'static>(mut self) -> Self {
        self.accessors.insert(
            TypeId::of::<T>(),
            (std::any::type_name::<T>(), parent_of::<T>),
        );
        self
    }

    /// Returns the declared parent accessor of a type, if any.
    pub fn accessor(&self, type_id: TypeId) -> Option<ParentAccessor> {
        self.accessors.get(&type_id).map(|(_, accessor)| *accessor)
    }

    /// Returns the parent object of `object`.
    ///
    /// `None` means "place under the root": either the type declares no
    /// parent, or its accessor produced none.
    pub fn parent_of(&self, object: &dyn DomainObject) -> Option<Arc<dyn DomainObject>> {
        let accessor = self.accessor(type_id_of(object))?;
        accessor(object.as_any())
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

impl fmt::Debug for ParentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.accessors.values().map(|(name, _)| *name).collect();
        types.sort_unstable();
        f.debug_struct("ParentRegistry")
            .field("types", &types)
            .finish()
    }
}

fn parent_of<T: HasParentContext + 'static>(object: &dyn Any) -> Option<Arc<dyn DomainObject>> {
    object.downcast_ref::<T>()?.parent_context()
}
