//! Policy dispatch ahead of super-admin and hierarchy checks.

use std::sync::Arc;

use scopeacl_storage::UserId;

use super::mocks::{Fixture, TestService};
use crate::access::AccessControlService;
use crate::context::{DomainObject, ParentRegistry, Subject};
use crate::error::DomainError;
use crate::policy::{AbilityResponse, BeforeVerdict, Policy, PolicyRegistry};

const AUTHOR: UserId = 42;
const SUSPENDED: UserId = 66;

struct Post {
    id: i64,
    author_id: UserId,
    locked: bool,
}

impl DomainObject for Post {
    fn level(&self) -> &str {
        "post"
    }

    fn instance_id(&self) -> i64 {
        self.id
    }
}

struct PostPolicy;

impl Policy for PostPolicy {
    type Subject = Post;

    fn actions(&self) -> &'static [&'static str] {
        &["update"]
    }

    fn before(&self, user: UserId, _ability: &str) -> BeforeVerdict {
        if user == SUSPENDED {
            BeforeVerdict::Deny("account suspended".to_string())
        } else {
            BeforeVerdict::Defer
        }
    }

    fn check(&self, user: UserId, _action: &str, post: Option<&Post>) -> AbilityResponse {
        match post {
            Some(post) if post.locked => AbilityResponse::deny("post is locked"),
            Some(post) => (post.author_id == user).into(),
            None => AbilityResponse::Deny,
        }
    }
}

fn service(fixture: &Fixture) -> TestService {
    AccessControlService::builder(
        Arc::clone(&fixture.contexts),
        Arc::clone(&fixture.reader),
        Arc::clone(&fixture.kv),
    )
    .parents(ParentRegistry::new())
    .policies(PolicyRegistry::new().register(PostPolicy).unwrap())
    .build()
}

fn post(author_id: UserId, locked: bool) -> Post {
    Post {
        id: 3,
        author_id,
        locked,
    }
}

#[tokio::test]
async fn test_policy_allows_without_any_role() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let post = post(AUTHOR, false);

    let allowed = service
        .session()
        .check(AUTHOR, "post:update", Subject::object(&post))
        .await
        .unwrap();

    assert!(allowed);
    assert_eq!(fixture.reader.calls(), 0);
}

#[tokio::test]
async fn test_policy_plain_deny_overrides_super_admin() {
    let fixture = Fixture::new().with_super_admin_role();
    fixture.assignments.assign_role(7, 1, 1).unwrap();
    let service = service(&fixture);
    let post = post(AUTHOR, false);

    let allowed = service
        .session()
        .check(7, "post:update", Subject::object(&post))
        .await
        .unwrap();

    assert!(!allowed);
}

#[tokio::test]
async fn test_policy_denial_reason_reaches_caller() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let post = post(AUTHOR, true);

    let err = service
        .session()
        .check(AUTHOR, "post:update", Subject::object(&post))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::AuthorizationDenied { .. }));
    assert_eq!(err.denial_reason(), Some("post is locked"));
    assert_eq!(
        err.to_string(),
        "authorization denied for 'post:update': post is locked"
    );
}

#[tokio::test]
async fn test_before_hook_denial_carries_reason() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let post = post(SUSPENDED, false);

    let err = service
        .session()
        .authorize(SUSPENDED, "post:delete", Subject::object(&post))
        .await
        .unwrap_err();

    assert_eq!(err.denial_reason(), Some("account suspended"));
}

#[tokio::test]
async fn test_undeclared_action_falls_through_to_roles() {
    let fixture = Fixture::new();
    fixture.assignments.upsert_role(4, "moderator");
    fixture.assignments.grant_permission(4, "post:delete").unwrap();
    let service = service(&fixture);
    let post = post(AUTHOR, false);
    let post_ctx = service.resolver().resolve(Subject::object(&post)).await.unwrap();
    fixture.assignments.assign_role(8, 4, post_ctx.id()).unwrap();
    let session = service.session();

    assert!(session.check(8, "post:delete", Subject::object(&post)).await.unwrap());
    assert!(!session.check(AUTHOR, "post:delete", Subject::object(&post)).await.unwrap());
}

#[tokio::test]
async fn test_type_level_check_reaches_policy_without_instance() {
    let fixture = Fixture::new();
    let service = service(&fixture);

    let allowed = service
        .session()
        .check(AUTHOR, "post:update", Subject::of_type::<Post>())
        .await
        .unwrap();

    assert!(!allowed);
}
