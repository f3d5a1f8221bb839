//! Mock collaborators and domain types for access control testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scopeacl_storage::{
    AssignmentReader, AssignmentRow, ContextRecord, MemoryAssignmentStore, MemoryContextStore,
    MemoryKeyValueStore, StorageError, StorageResult, UserId,
};

use crate::access::AccessControlService;
use crate::context::{DomainObject, HasParentContext, ParentRegistry};

/// Assignment reader that counts bulk loads.
///
/// Each load stalls briefly so concurrent misses overlap.
pub struct CountingReader {
    pub inner: Arc<MemoryAssignmentStore>,
    calls: AtomicUsize,
}

impl CountingReader {
    pub fn new(inner: Arc<MemoryAssignmentStore>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssignmentReader for CountingReader {
    async fn load_assignments(&self, user_id: UserId) -> StorageResult<Vec<AssignmentRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.inner.load_assignments(user_id).await
    }
}

/// Assignment reader whose backend is down.
pub struct UnavailableReader;

#[async_trait]
impl AssignmentReader for UnavailableReader {
    async fn load_assignments(&self, _user_id: UserId) -> StorageResult<Vec<AssignmentRow>> {
        Err(StorageError::ConnectionError {
            message: "assignment backend unavailable".to_string(),
        })
    }
}

pub struct Course {
    pub id: i64,
}

impl DomainObject for Course {
    fn level(&self) -> &str {
        "course"
    }

    fn instance_id(&self) -> i64 {
        self.id
    }
}

pub struct Page {
    pub id: i64,
    pub course: Arc<Course>,
}

impl Page {
    pub fn in_course(id: i64, course_id: i64) -> Self {
        Self {
            id,
            course: Arc::new(Course { id: course_id }),
        }
    }
}

impl DomainObject for Page {
    fn level(&self) -> &str {
        "page"
    }

    fn instance_id(&self) -> i64 {
        self.id
    }
}

impl HasParentContext for Page {
    fn parent_context(&self) -> Option<Arc<dyn DomainObject>> {
        Some(self.course.clone() as Arc<dyn DomainObject>)
    }
}

pub type TestService = AccessControlService<MemoryContextStore, CountingReader, MemoryKeyValueStore>;

/// Collaborators of a test service, kept for assertions and mutation.
pub struct Fixture {
    pub contexts: Arc<MemoryContextStore>,
    pub assignments: Arc<MemoryAssignmentStore>,
    pub reader: Arc<CountingReader>,
    pub kv: Arc<MemoryKeyValueStore>,
}

impl Fixture {
    pub fn new() -> Self {
        let assignments = MemoryAssignmentStore::new_shared();
        Self {
            contexts: MemoryContextStore::new_shared(),
            reader: Arc::new(CountingReader::new(Arc::clone(&assignments))),
            assignments,
            kv: MemoryKeyValueStore::new_shared(),
        }
    }

    /// Adds course 7 as context 5 (`1/5/`).
    pub fn with_course_context(self) -> Self {
        self.contexts.insert_record(ContextRecord {
            id: 5,
            parent_id: Some(1),
            level: "course".to_string(),
            instance_id: Some(7),
            depth: 1,
            path: "1/5/".to_string(),
        });
        self
    }

    /// Creates role 9 "editor" with `edit:page`.
    pub fn with_editor_role(self) -> Self {
        self.assignments.upsert_role(9, "editor");
        self.assignments
            .grant_permission(9, "edit:page")
            .expect("role exists");
        self
    }

    pub fn with_super_admin_role(self) -> Self {
        self.assignments.upsert_role(1, "super-admin");
        self
    }

    pub fn service(&self) -> TestService {
        AccessControlService::builder(
            Arc::clone(&self.contexts),
            Arc::clone(&self.reader),
            Arc::clone(&self.kv),
        )
        .parents(ParentRegistry::new().register::<Page>())
        .build()
    }
}
