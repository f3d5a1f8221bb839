//! Per-type policies that take precedence over role-based checks.
//!
//! A [`Policy`] is registered once per domain type in a [`PolicyRegistry`].
//! When an ability is checked against an object (or type) with a registered
//! policy, the policy is consulted first:
//!
//! 1. [`Policy::before`] may decide outright or [`BeforeVerdict::Defer`].
//! 2. Otherwise the action named by the ability's last `:` segment
//!    (`post:update` -> `update`) is passed to [`Policy::check`], provided the
//!    policy declared that action.
//!
//! Undeclared actions leave the decision to the role-based checks. Declared
//! actions are validated at registration, not at check time.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use scopeacl_storage::UserId;

use crate::context::Subject;
use crate::error::{DomainError, DomainResult};

/// Outcome of a policy's `before` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeforeVerdict {
    Allow,
    Deny(String),
    /// No opinion; continue with the ability action.
    Defer,
}

/// Outcome of a policy's ability action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbilityResponse {
    Allow,
    /// Plain denial, reported to callers as `false`.
    Deny,
    /// Denial whose reason must reach the caller.
    DenyWithReason(String),
}

impl AbilityResponse {
    pub fn deny(reason: impl Into<String>) -> Self {
        AbilityResponse::DenyWithReason(reason.into())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AbilityResponse::Allow)
    }
}

impl From<bool> for AbilityResponse {
    fn from(allowed: bool) -> Self {
        if allowed {
            AbilityResponse::Allow
        } else {
            AbilityResponse::Deny
        }
    }
}

/// Fine-grained ability checks for one domain type.
///
/// # Example
///
/// ```rust,ignore
/// struct PostPolicy;
///
/// impl Policy for PostPolicy {
///     type Subject = Post;
///
///     fn actions(&self) -> &'static [&'static str] {
///         &["update", "create"]
///     }
///
///     fn check(&self, user: UserId, action: &str, post: Option<&Post>) -> AbilityResponse {
///         match (action, post) {
///             ("update", Some(post)) if post.locked => AbilityResponse::deny("post is locked"),
///             ("update", Some(post)) => (post.author_id == user).into(),
///             _ => AbilityResponse::Deny,
///         }
///     }
/// }
/// ```
pub trait Policy: Send + Sync + 'static {
    /// The domain type this policy governs.
    type Subject: Any;

    /// Action names this policy answers. Must be non-empty and contain no `:`.
    fn actions(&self) -> &'static [&'static str];

    /// Consulted before any action; returning anything but
    /// [`BeforeVerdict::Defer`] decides the check.
    fn before(&self, _user: UserId, _ability: &str) -> BeforeVerdict {
        BeforeVerdict::Defer
    }

    /// Decides a declared action. `subject` is `None` for type-level checks.
    fn check(
        &self,
        user: UserId,
        action: &str,
        subject: Option<&Self::Subject>,
    ) -> AbilityResponse;
}

/// Object-safe view of a registered policy.
trait ErasedPolicy: Send + Sync {
    fn before(&self, user: UserId, ability: &str) -> BeforeVerdict;
    fn supports(&self, action: &str) -> bool;
    fn check(&self, user: UserId, action: &str, instance: Option<&dyn Any>) -> AbilityResponse;
}

struct Registered<P> {
    policy: P,
    actions: BTreeSet<&'static str>,
}

impl<P: Policy> ErasedPolicy for Registered<P> {
    fn before(&self, user: UserId, ability: &str) -> BeforeVerdict {
        self.policy.before(user, ability)
    }

    fn supports(&self, action: &str) -> bool {
        self.actions.contains(action)
    }

    fn check(&self, user: UserId, action: &str, instance: Option<&dyn Any>) -> AbilityResponse {
        let subject = instance.and_then(|any| any.downcast_ref::<P::Subject>());
        self.policy.check(user, action, subject)
    }
}

/// Returns the action an ability maps to: the segment after the last `:`.
pub fn action_of(ability: &str) -> &str {
    ability.rsplit(':').next().unwrap_or(ability)
}

/// Typed policy registry, built at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    policies: HashMap<TypeId, (&'static str, Arc<dyn ErasedPolicy>)>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `policy` for `P::Subject`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidPolicy`] if the type already has a
    /// policy, or if the declared actions are empty or malformed.
    pub fn register<P: Policy>(mut self, policy: P) -> DomainResult<Self> {
        let type_name = std::any::type_name::<P::Subject>();
        let invalid = |message: String| DomainError::InvalidPolicy {
            type_name: type_name.to_string(),
            message,
        };

        let type_id = TypeId::of::<P::Subject>();
        if self.policies.contains_key(&type_id) {
            return Err(invalid("a policy is already registered".to_string()));
        }

        let declared = policy.actions();
        if declared.is_empty() {
            return Err(invalid("policy declares no actions".to_string()));
        }
        let mut actions = BTreeSet::new();
        for action in declared {
            if action.is_empty() || action.contains(':') || action.contains(char::is_whitespace)
            {
                return Err(invalid(format!("invalid action name '{action}'")));
            }
            if !actions.insert(*action) {
                return Err(invalid(format!("duplicate action '{action}'")));
            }
        }

        self.policies
            .insert(type_id, (type_name, Arc::new(Registered { policy, actions })));
        Ok(self)
    }

    /// Returns true if `T` has a registered policy.
    pub fn has_policy_for<T: Any>(&self) -> bool {
        self.policies.contains_key(&TypeId::of::<T>())
    }

    /// Consults the policy registered for the subject's type.
    ///
    /// Returns `None` when there is no policy, when `before` defers and the
    /// action is undeclared, or for subjects without a type.
    pub fn evaluate(
        &self,
        user: UserId,
        ability: &str,
        subject: &Subject<'_>,
    ) -> Option<AbilityResponse> {
        let (_, policy) = self.policies.get(&subject.type_id()?)?;

        match policy.before(user, ability) {
            BeforeVerdict::Allow => return Some(AbilityResponse::Allow),
            BeforeVerdict::Deny(reason) => return Some(AbilityResponse::DenyWithReason(reason)),
            BeforeVerdict::Defer => {}
        }

        let action = action_of(ability);
        if !policy.supports(action) {
            return None;
        }
        Some(policy.check(user, action, subject.instance()))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.policies.values().map(|(name, _)| *name).collect();
        types.sort_unstable();
        f.debug_struct("PolicyRegistry")
            .field("types", &types)
            .finish()
    }
}
