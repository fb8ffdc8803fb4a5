use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Address of a document: `(collection, id)`.
///
/// Document ids are opaque to the store. Callers that build composite ids
/// (e.g. `{company}_{YYYY}_{MM}`) are responsible for making them unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    collection: String,
    id: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl core::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A committed document as seen by a non-transactional read.
///
/// `version` changes on every committed write of the document and is never
/// reused, so two reads observing the same version observed the same write.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: DocumentKey,
    pub version: u64,
    pub body: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// Document store operation error.
///
/// ## Error Categories
///
/// - **Conflict**: a document read by the transaction changed before commit.
///   Transient; the transaction runner retries these.
/// - **Backend**: the store is unavailable or rejected the operation.
/// - **Serialization**: a document body could not be (de)serialized.
/// - **RetriesExhausted**: the runner gave up after its retry budget.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),

    #[error("transaction gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },
}

impl StoreError {
    /// Whether retrying the whole transaction from its first read may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Serialization(value.to_string())
    }
}

/// One optimistic read-modify-write transaction.
///
/// Reads go to the store and record the version observed (absent documents
/// count as observed-absent). Writes are buffered and only become visible on
/// [`commit`](StoreTransaction::commit), which succeeds only if none of the
/// observed documents changed in the meantime. Dropping a transaction without
/// committing discards its writes.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    /// Read a document. Returns buffered writes of this transaction first.
    async fn get(&mut self, key: &DocumentKey) -> Result<Option<JsonValue>, StoreError>;

    /// Replace (or create) a document. Full overwrite, not a merge.
    fn set(&mut self, key: DocumentKey, body: JsonValue);

    /// Delete a document (no-op if it does not exist at commit time).
    fn delete(&mut self, key: DocumentKey);

    /// Atomically validate reads and apply writes, all or nothing.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transactional document store.
///
/// ## Design Principles
///
/// - **Optimistic concurrency**: transactions never hold locks while the
///   caller computes; conflicts are detected at commit time
/// - **All or nothing**: a failed commit applies none of its writes
/// - **No storage assumptions**: in-memory for tests/dev, Postgres for production
///
/// Retrying on conflict is not the store's job; see
/// [`TransactionRunner`](super::TransactionRunner).
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Start a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Non-transactional snapshot read of a single document.
    async fn read(&self, key: &DocumentKey) -> Result<Option<StoredDocument>, StoreError>;

    /// All documents of a collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;
}

#[async_trait::async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn read(&self, key: &DocumentKey) -> Result<Option<StoredDocument>, StoreError> {
        (**self).read(key).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        (**self).list(collection).await
    }
}
