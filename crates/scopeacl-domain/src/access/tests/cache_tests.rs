//! Cache coherency, invalidation and concurrent misses.

use std::sync::Arc;

use scopeacl_storage::{AssignmentReader, KeyValueStore};
use tokio::sync::Barrier;

use super::mocks::{Fixture, Page};
use crate::cache::{persistent_key, CacheConfig, CacheTier};
use crate::context::Subject;
use crate::permission::PermissionSnapshot;

const USER: i64 = 42;

#[tokio::test]
async fn test_cold_and_warm_checks_agree() {
    let fixture = Fixture::new().with_editor_role();
    let service = fixture.service();
    let page = Page::in_course(30, 7);
    let page_ctx = service.resolver().resolve(Subject::object(&page)).await.unwrap();
    fixture
        .assignments
        .assign_role(USER, 9, page_ctx.parent_id().unwrap())
        .unwrap();

    let abilities = ["edit:page", "view:page"];
    let mut cold = Vec::new();
    for ability in abilities {
        cold.push(
            service
                .session()
                .check(USER, ability, Subject::object(&page))
                .await
                .unwrap(),
        );
        service.cache().invalidate_shared(USER).await.unwrap();
    }

    let warm_session = service.session();
    warm_session.snapshot(USER).await.unwrap();
    let mut warm = Vec::new();
    for ability in abilities {
        warm.push(
            warm_session
                .check(USER, ability, Subject::object(&page))
                .await
                .unwrap(),
        );
    }

    assert_eq!(cold, vec![true, false]);
    assert_eq!(cold, warm);
}

#[tokio::test]
async fn test_snapshot_is_loaded_once_across_sessions() {
    let fixture = Fixture::new().with_editor_role();
    fixture.assignments.assign_role(USER, 9, 1).unwrap();
    let service = fixture.service();

    for _ in 0..5 {
        assert!(service
            .session()
            .check(USER, "edit:page", Subject::Root)
            .await
            .unwrap());
    }

    assert_eq!(fixture.reader.calls(), 1);
    let counters = service.cache().counters().snapshot();
    assert_eq!(counters.misses, 1);
    assert_eq!(counters.l1_hits, 4);
}

#[tokio::test]
async fn test_persistent_tier_serves_other_processes() {
    let fixture = Fixture::new().with_editor_role();
    fixture.assignments.assign_role(USER, 9, 1).unwrap();
    let first = fixture.service();
    // A second process shares only the persistent tier.
    let second = fixture.service();

    assert!(first.session().check(USER, "edit:page", Subject::Root).await.unwrap());
    let session = second.session();
    assert!(session.check(USER, "edit:page", Subject::Root).await.unwrap());

    assert_eq!(fixture.reader.calls(), 1);
    assert_eq!(second.cache().counters().snapshot().l2_hits, 1);
    assert!(fixture.kv.contains_key(&persistent_key(USER)));
}

#[tokio::test]
async fn test_invalidation_forces_reload() {
    let fixture = Fixture::new().with_editor_role();
    fixture.assignments.assign_role(USER, 9, 1).unwrap();
    let service = fixture.service();

    service.session().check(USER, "edit:page", Subject::Root).await.unwrap();
    service.session().check(USER, "edit:page", Subject::Root).await.unwrap();
    assert_eq!(fixture.reader.calls(), 1);

    service.cache().invalidate_shared(USER).await.unwrap();
    service.session().check(USER, "edit:page", Subject::Root).await.unwrap();

    assert_eq!(fixture.reader.calls(), 2);
}

#[tokio::test]
async fn test_revocation_is_visible_after_invalidation() {
    let fixture = Fixture::new().with_editor_role();
    fixture.assignments.assign_role(USER, 9, 1).unwrap();
    let service = fixture.service();
    let in_flight = service.session();
    assert!(in_flight.check(USER, "edit:page", Subject::Root).await.unwrap());

    fixture.assignments.revoke_role(USER, 9, 1);
    service.cache().invalidate_shared(USER).await.unwrap();

    // The in-flight unit of work keeps its request-local snapshot.
    assert!(in_flight.check(USER, "edit:page", Subject::Root).await.unwrap());
    assert!(!service
        .session()
        .check(USER, "edit:page", Subject::Root)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_session_invalidate_clears_its_own_tier() {
    let fixture = Fixture::new().with_editor_role();
    fixture.assignments.assign_role(USER, 9, 1).unwrap();
    let service = fixture.service();
    let session = service.session();
    assert!(session.check(USER, "edit:page", Subject::Root).await.unwrap());

    fixture.assignments.revoke_role(USER, 9, 1);
    session.invalidate(USER).await.unwrap();

    assert!(!session.check(USER, "edit:page", Subject::Root).await.unwrap());
    assert_eq!(fixture.reader.calls(), 2);
}

#[tokio::test]
async fn test_sessions_do_not_share_request_tier() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let first = service.session();
    first.snapshot(USER).await.unwrap();

    let (_, tier) = service
        .cache()
        .get_with_tier(&crate::cache::RequestCache::new(), USER)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(tier, CacheTier::Shared);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_misses_agree() {
    const TASKS: usize = 16;
    let fixture = Fixture::new().with_editor_role();
    fixture.assignments.assign_role(USER, 9, 1).unwrap();
    let service = Arc::new(fixture.service());
    let barrier = Arc::new(Barrier::new(TASKS));

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                service
                    .session()
                    .check(USER, "edit:page", Subject::Root)
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    // Misses overlapped, so several loads raced to write the snapshot.
    assert!(fixture.reader.calls() > 1);

    let authoritative = PermissionSnapshot::from_assignments(
        fixture.reader.inner.load_assignments(USER).await.unwrap(),
    );
    let persisted = fixture
        .kv
        .get(&persistent_key(USER))
        .await
        .unwrap()
        .expect("snapshot persisted");
    assert_eq!(PermissionSnapshot::from_bytes(&persisted).unwrap(), authoritative);
}

#[tokio::test]
async fn test_without_shared_memory_tier() {
    let fixture = Fixture::new().with_editor_role();
    fixture.assignments.assign_role(USER, 9, 1).unwrap();
    let service = crate::access::AccessControlService::builder(
        Arc::clone(&fixture.contexts),
        Arc::clone(&fixture.reader),
        Arc::clone(&fixture.kv),
    )
    .config(
        crate::access::ServiceConfig::default()
            .with_cache(CacheConfig::default().with_shared_enabled(false)),
    )
    .build();

    assert!(service.session().check(USER, "edit:page", Subject::Root).await.unwrap());
    assert!(service.session().check(USER, "edit:page", Subject::Root).await.unwrap());

    let counters = service.cache().counters().snapshot();
    assert_eq!(counters.l1_hits, 0);
    assert_eq!(counters.l2_hits, 1);
    assert_eq!(fixture.reader.calls(), 1);
}
