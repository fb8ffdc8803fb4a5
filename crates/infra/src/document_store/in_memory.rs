use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::r#trait::{DocumentKey, DocumentStore, StoreError, StoreTransaction, StoredDocument};

#[derive(Debug, Clone)]
struct Entry {
    version: u64,
    body: JsonValue,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    docs: HashMap<DocumentKey, Entry>,
    /// Last version handed out; versions are global so a deleted and
    /// re-created document never repeats an old version.
    last_version: u64,
}

/// In-memory optimistic document store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn observed_version(state: &State, key: &DocumentKey) -> u64 {
        state.docs.get(key).map(|e| e.version).unwrap_or(0)
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            reads: HashMap::new(),
            writes: BTreeMap::new(),
        }))
    }

    async fn read(&self, key: &DocumentKey) -> Result<Option<StoredDocument>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.docs.get(key).map(|e| StoredDocument {
            key: key.clone(),
            version: e.version,
            body: e.body.clone(),
            updated_at: e.updated_at,
        }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut docs: Vec<StoredDocument> = state
            .docs
            .iter()
            .filter(|(k, _)| k.collection() == collection)
            .map(|(k, e)| StoredDocument {
                key: k.clone(),
                version: e.version,
                body: e.body.clone(),
                updated_at: e.updated_at,
            })
            .collect();
        docs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(docs)
    }
}

struct InMemoryTransaction {
    state: Arc<RwLock<State>>,
    /// First version observed per key (0 = absent).
    reads: HashMap<DocumentKey, u64>,
    /// Buffered writes; `None` is a delete.
    writes: BTreeMap<DocumentKey, Option<JsonValue>>,
}

#[async_trait::async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get(&mut self, key: &DocumentKey) -> Result<Option<JsonValue>, StoreError> {
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }

        let state = self.state.read().map_err(|_| poisoned())?;
        let version = InMemoryDocumentStore::observed_version(&state, key);
        self.reads.entry(key.clone()).or_insert(version);
        Ok(state.docs.get(key).map(|e| e.body.clone()))
    }

    fn set(&mut self, key: DocumentKey, body: JsonValue) {
        self.writes.insert(key, Some(body));
    }

    fn delete(&mut self, key: DocumentKey) {
        self.writes.insert(key, None);
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut state = this.state.write().map_err(|_| poisoned())?;

        for (key, observed) in &this.reads {
            let current = InMemoryDocumentStore::observed_version(&state, key);
            if current != *observed {
                return Err(StoreError::Conflict(format!(
                    "{key} changed since read (read version {observed}, now {current})"
                )));
            }
        }

        if this.writes.is_empty() {
            return Ok(());
        }

        state.last_version += 1;
        let version = state.last_version;
        let now = Utc::now();
        for (key, write) in this.writes {
            match write {
                Some(body) => {
                    state.docs.insert(
                        key,
                        Entry {
                            version,
                            body,
                            updated_at: now,
                        },
                    );
                }
                None => {
                    state.docs.remove(&key);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(id: &str) -> DocumentKey {
        DocumentKey::new("counters", id)
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = InMemoryDocumentStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.get(&key("a")).await.unwrap(), None);
        tx.set(key("a"), json!({"currentValue": 1}));
        tx.commit().await.unwrap();

        let doc = store.read(&key("a")).await.unwrap().unwrap();
        assert_eq!(doc.body, json!({"currentValue": 1}));
        assert!(doc.version > 0);
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded_on_drop() {
        let store = InMemoryDocumentStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.set(key("a"), json!(1));
        }
        assert!(store.read(&key("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = InMemoryDocumentStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.set(key("a"), json!(5));
        assert_eq!(tx.get(&key("a")).await.unwrap(), Some(json!(5)));
        tx.delete(key("a"));
        assert_eq!(tx.get(&key("a")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_read_modify_write_conflicts() {
        let store = InMemoryDocumentStore::new();

        let mut t1 = store.begin().await.unwrap();
        let mut t2 = store.begin().await.unwrap();
        assert_eq!(t1.get(&key("a")).await.unwrap(), None);
        assert_eq!(t2.get(&key("a")).await.unwrap(), None);

        t1.set(key("a"), json!(1));
        t2.set(key("a"), json!(1));

        t1.commit().await.unwrap();
        let err = t2.commit().await.unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err:?}");

        let doc = store.read(&key("a")).await.unwrap().unwrap();
        assert_eq!(doc.body, json!(1));
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = InMemoryDocumentStore::new();

        let mut seed = store.begin().await.unwrap();
        seed.set(key("a"), json!(1));
        seed.commit().await.unwrap();

        let mut stale = store.begin().await.unwrap();
        stale.get(&key("a")).await.unwrap();
        stale.set(key("a"), json!(2));
        stale.set(key("b"), json!(2));

        let mut winner = store.begin().await.unwrap();
        winner.get(&key("a")).await.unwrap();
        winner.set(key("a"), json!(10));
        winner.commit().await.unwrap();

        assert!(stale.commit().await.unwrap_err().is_conflict());
        assert_eq!(store.read(&key("a")).await.unwrap().unwrap().body, json!(10));
        assert!(store.read(&key("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_then_recreate_does_not_reuse_versions() {
        let store = InMemoryDocumentStore::new();

        let mut create = store.begin().await.unwrap();
        create.set(key("a"), json!(1));
        create.commit().await.unwrap();

        let mut reader = store.begin().await.unwrap();
        reader.get(&key("a")).await.unwrap();
        reader.set(key("a"), json!("from reader"));

        let mut delete = store.begin().await.unwrap();
        delete.delete(key("a"));
        delete.commit().await.unwrap();

        let mut recreate = store.begin().await.unwrap();
        recreate.set(key("a"), json!(1));
        recreate.commit().await.unwrap();

        assert!(reader.commit().await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn writes_to_different_documents_do_not_conflict() {
        let store = InMemoryDocumentStore::new();

        let mut t1 = store.begin().await.unwrap();
        let mut t2 = store.begin().await.unwrap();
        t1.get(&key("a")).await.unwrap();
        t2.get(&key("b")).await.unwrap();
        t1.set(key("a"), json!(1));
        t2.set(key("b"), json!(1));

        t1.commit().await.unwrap();
        t2.commit().await.unwrap();
    }

    #[tokio::test]
    async fn list_is_scoped_to_collection_and_sorted() {
        let store = InMemoryDocumentStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.set(DocumentKey::new("orders", "b"), json!(2));
        tx.set(DocumentKey::new("orders", "a"), json!(1));
        tx.set(DocumentKey::new("counters", "x"), json!(0));
        tx.commit().await.unwrap();

        let ids: Vec<String> = store
            .list("orders")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.key.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
