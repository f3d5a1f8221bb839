//! What an ability is checked against.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use super::Context;

/// Object-safe access to `Any`, implemented for every `'static` type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Returns the concrete type behind a trait object.
///
/// Takes `&dyn DomainObject` so the call dispatches through the vtable rather
/// than resolving `AsAny` for a reference type.
pub(crate) fn type_id_of(object: &dyn DomainObject) -> TypeId {
    object.as_any().type_id()
}

/// A domain object that can own an authorization context.
///
/// `(level(), instance_id())` identifies the object's context node.
pub trait DomainObject: AsAny + Send + Sync {
    /// Level tag of the type, e.g. `"course"`. Must be stable per type.
    fn level(&self) -> &str;

    /// Identity of this instance within its level.
    fn instance_id(&self) -> i64;
}

/// Capability of domain types whose context hangs below another object's.
///
/// Types register this capability once in a
/// [`ParentRegistry`](super::ParentRegistry); unregistered types are placed
/// directly under the root context.
pub trait HasParentContext: DomainObject {
    /// The object whose context is this object's parent, or `None` to place
    /// it under the root.
    fn parent_context(&self) -> Option<Arc<dyn DomainObject>>;
}

/// A type used as a subject without an instance, e.g. for `post:create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubjectType {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl SubjectType {
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// The subject of an ability check.
#[derive(Clone, Copy)]
pub enum Subject<'a> {
    /// No subject: the check is scoped to the root context.
    Root,
    /// An already-resolved context.
    Context(&'a Context),
    /// A domain object; its context is looked up or created.
    Object(&'a dyn DomainObject),
    /// A domain type without an instance; scoped to the root context.
    Type(SubjectType),
}

impl<'a> Subject<'a> {
    pub fn object<T: DomainObject + 'static>(object: &'a T) -> Self {
        Subject::Object(object)
    }

    pub fn of_type<T: Any>() -> Self {
        Subject::Type(SubjectType::of::<T>())
    }

    /// The concrete Rust type behind an object or type subject.
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            Subject::Object(object) => Some(type_id_of(*object)),
            Subject::Type(ty) => Some(ty.type_id),
            Subject::Root | Subject::Context(_) => None,
        }
    }

    /// The instance behind an object subject.
    pub fn instance(&self) -> Option<&'a dyn Any> {
        match self {
            Subject::Object(object) => Some((*object).as_any()),
            _ => None,
        }
    }
}

impl<'a> From<&'a Context> for Subject<'a> {
    fn from(context: &'a Context) -> Self {
        Subject::Context(context)
    }
}

impl fmt::Debug for Subject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Root => f.write_str("Root"),
            Subject::Context(ctx) => f.debug_tuple("Context").field(&ctx.id()).finish(),
            Subject::Object(object) => f
                .debug_struct("Object")
                .field("level", &object.level())
                .field("instance_id", &object.instance_id())
                .finish(),
            Subject::Type(ty) => f.debug_tuple("Type").field(&ty.type_name).finish(),
        }
    }
}
