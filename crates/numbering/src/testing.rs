//! Store wrapper that injects commit failures and forces interleaving.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde_json::Value as JsonValue;

use freightdesk_infra::{
    DocumentKey, DocumentStore, InMemoryDocumentStore, StoreError, StoreTransaction, StoredDocument,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Conflict,
    Backend,
}

#[derive(Debug, Default)]
struct Faults {
    begin_calls: AtomicU32,
    failing_commits: AtomicU32,
    backend: AtomicBool,
    unavailable: AtomicBool,
    interleave: AtomicBool,
    conflicts: AtomicU32,
}

/// Delegates to an in-memory store; the next `n` commits fail without
/// applying anything.
#[derive(Debug, Clone)]
pub struct FlakyStore {
    inner: InMemoryDocumentStore,
    faults: Arc<Faults>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryDocumentStore) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Store whose transactions yield to the scheduler after every read and
    /// before every commit, the way a networked store suspends on I/O.
    pub fn interleaved(inner: InMemoryDocumentStore) -> Self {
        let store = Self::new(inner);
        store.faults.interleave.store(true, Ordering::SeqCst);
        store
    }

    pub fn inner(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    pub fn begin_calls(&self) -> u32 {
        self.faults.begin_calls.load(Ordering::SeqCst)
    }

    /// Commits rejected by the underlying store because a rival got there first.
    pub fn conflicts(&self) -> u32 {
        self.faults.conflicts.load(Ordering::SeqCst)
    }

    pub fn fail_next_commits(&self, n: u32, kind: FailureKind) {
        self.faults
            .backend
            .store(kind == FailureKind::Backend, Ordering::SeqCst);
        self.faults.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Every `begin` fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DocumentStore for FlakyStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.faults.begin_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store offline".to_string()));
        }
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin().await?,
            faults: self.faults.clone(),
        }))
    }

    async fn read(&self, key: &DocumentKey) -> Result<Option<StoredDocument>, StoreError> {
        self.inner.read(key).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        self.inner.list(collection).await
    }
}

struct FlakyTransaction {
    inner: Box<dyn StoreTransaction>,
    faults: Arc<Faults>,
}

#[async_trait::async_trait]
impl StoreTransaction for FlakyTransaction {
    async fn get(&mut self, key: &DocumentKey) -> Result<Option<JsonValue>, StoreError> {
        let value = self.inner.get(key).await?;
        pause(&self.faults).await;
        Ok(value)
    }

    fn set(&mut self, key: DocumentKey, body: JsonValue) {
        self.inner.set(key, body);
    }

    fn delete(&mut self, key: DocumentKey) {
        self.inner.delete(key);
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let pending = self
            .faults
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(if self.faults.backend.load(Ordering::SeqCst) {
                StoreError::Backend("injected commit failure".to_string())
            } else {
                StoreError::Conflict("injected conflict".to_string())
            });
        }
        pause(&self.faults).await;
        let result = self.inner.commit().await;
        if matches!(result, Err(ref e) if e.is_conflict()) {
            self.faults.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

async fn pause(faults: &Faults) {
    if faults.interleave.load(Ordering::SeqCst) {
        tokio::task::yield_now().await;
    }
}
