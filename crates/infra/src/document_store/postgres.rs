//! Postgres-backed document store implementation.
//!
//! Documents live in a single table keyed by `(collection, id)`. Every write
//! stamps the row with a fresh value from the `document_versions` sequence, so
//! a version observed by a read identifies exactly one committed write.
//!
//! ## Commit Protocol
//!
//! Reads happen outside any SQL transaction and remember the version they saw
//! (`0` for an absent row). `commit()` opens one SQL transaction and:
//!
//! | Buffered op | Observed | Statement | Conflict when |
//! |-------------|----------|-----------|---------------|
//! | set | absent | `INSERT` | unique violation (`23505`) |
//! | set | version `v` | `UPDATE ... WHERE version = v` | 0 rows affected |
//! | set | not read | `INSERT ... ON CONFLICT DO UPDATE` | never |
//! | delete | version `v` | `DELETE ... WHERE version = v` | 0 rows affected |
//! | delete | absent | `SELECT version ... FOR SHARE` | row exists |
//! | delete | not read | `DELETE` | never |
//! | (read only) | any | `SELECT version ... FOR SHARE` | version differs |
//!
//! Any conflict rolls the SQL transaction back, so nothing is applied.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (deadlock detected) | `40P01` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / network / other | N/A | `Backend` |

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use super::r#trait::{DocumentKey, DocumentStore, StoreError, StoreTransaction, StoredDocument};

/// Postgres-backed optimistic document store.
///
/// `PgPool` is internally reference counted, so cloning the store is cheap and
/// all clones share one pool.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the version sequence and documents table if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query("CREATE SEQUENCE IF NOT EXISTS document_versions")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_sequence", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                version BIGINT NOT NULL,
                body JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_table", e))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(PostgresTransaction {
            pool: self.pool.clone(),
            reads: HashMap::new(),
            writes: BTreeMap::new(),
        }))
    }

    #[instrument(skip(self, key), fields(key = %key), err)]
    async fn read(&self, key: &DocumentKey) -> Result<Option<StoredDocument>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT collection, id, version, body, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(key.collection())
        .bind(key.id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("read", e))?;

        row.map(|r| stored_document_from_row(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT collection, id, version, body, updated_at
            FROM documents
            WHERE collection = $1
            ORDER BY id ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(stored_document_from_row).collect()
    }
}

struct PostgresTransaction {
    pool: PgPool,
    /// First version observed per key (0 = absent).
    reads: HashMap<DocumentKey, u64>,
    /// Buffered writes; `None` is a delete.
    writes: BTreeMap<DocumentKey, Option<JsonValue>>,
}

#[async_trait::async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn get(&mut self, key: &DocumentKey) -> Result<Option<JsonValue>, StoreError> {
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }

        let row = sqlx::query("SELECT version, body FROM documents WHERE collection = $1 AND id = $2")
            .bind(key.collection())
            .bind(key.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("tx_get", e))?;

        let (version, body) = match row {
            Some(r) => {
                let version: i64 = r
                    .try_get("version")
                    .map_err(|e| StoreError::Backend(format!("failed to read version: {e}")))?;
                let body: JsonValue = r
                    .try_get("body")
                    .map_err(|e| StoreError::Backend(format!("failed to read body: {e}")))?;
                (version as u64, Some(body))
            }
            None => (0, None),
        };

        self.reads.entry(key.clone()).or_insert(version);
        Ok(body)
    }

    fn set(&mut self, key: DocumentKey, body: JsonValue) {
        self.writes.insert(key, Some(body));
    }

    fn delete(&mut self, key: DocumentKey) {
        self.writes.insert(key, None);
    }

    #[instrument(skip_all, err)]
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        let mut tx = this
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for (key, observed) in &this.reads {
            if this.writes.contains_key(key) {
                continue;
            }
            let current = current_version(&mut tx, key).await?;
            if current != *observed {
                return Err(StoreError::Conflict(format!(
                    "{key} changed since read (read version {observed}, now {current})"
                )));
            }
        }

        for (key, write) in &this.writes {
            let observed = this.reads.get(key).copied();
            match (write, observed) {
                (Some(body), Some(0)) => insert(&mut tx, key, body).await?,
                (Some(body), Some(v)) => update_if_version(&mut tx, key, body, v).await?,
                (Some(body), None) => upsert(&mut tx, key, body).await?,
                (None, Some(0)) => {
                    if current_version(&mut tx, key).await? != 0 {
                        return Err(StoreError::Conflict(format!("{key} was created concurrently")));
                    }
                }
                (None, Some(v)) => delete_if_version(&mut tx, key, v).await?,
                (None, None) => delete(&mut tx, key).await?,
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

async fn current_version(
    tx: &mut Transaction<'static, Postgres>,
    key: &DocumentKey,
) -> Result<u64, StoreError> {
    let row = sqlx::query(
        "SELECT version FROM documents WHERE collection = $1 AND id = $2 FOR SHARE",
    )
    .bind(key.collection())
    .bind(key.id())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_version", e))?;

    match row {
        Some(r) => {
            let v: i64 = r
                .try_get("version")
                .map_err(|e| StoreError::Backend(format!("failed to read version: {e}")))?;
            Ok(v as u64)
        }
        None => Ok(0),
    }
}

async fn insert(
    tx: &mut Transaction<'static, Postgres>,
    key: &DocumentKey,
    body: &JsonValue,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO documents (collection, id, version, body, updated_at)
        VALUES ($1, $2, nextval('document_versions'), $3, NOW())
        "#,
    )
    .bind(key.collection())
    .bind(key.id())
    .bind(body)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Conflict(format!("{key} was created concurrently"))
        } else {
            map_sqlx_error("insert_document", e)
        }
    })?;
    Ok(())
}

async fn update_if_version(
    tx: &mut Transaction<'static, Postgres>,
    key: &DocumentKey,
    body: &JsonValue,
    observed: u64,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET version = nextval('document_versions'), body = $3, updated_at = NOW()
        WHERE collection = $1 AND id = $2 AND version = $4
        "#,
    )
    .bind(key.collection())
    .bind(key.id())
    .bind(body)
    .bind(observed as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_document", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "{key} changed since read (read version {observed})"
        )));
    }
    Ok(())
}

async fn upsert(
    tx: &mut Transaction<'static, Postgres>,
    key: &DocumentKey,
    body: &JsonValue,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO documents (collection, id, version, body, updated_at)
        VALUES ($1, $2, nextval('document_versions'), $3, NOW())
        ON CONFLICT (collection, id)
        DO UPDATE SET
            version = EXCLUDED.version,
            body = EXCLUDED.body,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(key.collection())
    .bind(key.id())
    .bind(body)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_document", e))?;
    Ok(())
}

async fn delete_if_version(
    tx: &mut Transaction<'static, Postgres>,
    key: &DocumentKey,
    observed: u64,
) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2 AND version = $3")
        .bind(key.collection())
        .bind(key.id())
        .bind(observed as i64)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_document", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "{key} changed since read (read version {observed})"
        )));
    }
    Ok(())
}

async fn delete(tx: &mut Transaction<'static, Postgres>, key: &DocumentKey) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
        .bind(key.collection())
        .bind(key.id())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_document", e))?;
    Ok(())
}

fn stored_document_from_row(row: &sqlx::postgres::PgRow) -> Result<StoredDocument, StoreError> {
    let read_err = |e: sqlx::Error| StoreError::Backend(format!("failed to deserialize document row: {e}"));

    let collection: String = row.try_get("collection").map_err(read_err)?;
    let id: String = row.try_get("id").map_err(read_err)?;
    let version: i64 = row.try_get("version").map_err(read_err)?;
    let body: JsonValue = row.try_get("body").map_err(read_err)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(read_err)?;

    Ok(StoredDocument {
        key: DocumentKey::new(collection, id),
        version: version as u64,
        body,
        updated_at,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // unique violation, serialization failure, deadlock
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn non_database_errors_are_backend_errors() {
        assert!(matches!(
            map_sqlx_error("read", sqlx::Error::PoolClosed),
            StoreError::Backend(ref m) if m.contains("read")
        ));
        assert!(matches!(
            map_sqlx_error("list", sqlx::Error::RowNotFound),
            StoreError::Backend(_)
        ));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    /// Runs only when `DATABASE_URL` points at a scratch database.
    #[tokio::test]
    async fn stale_read_conflicts_against_postgres() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let pool = PgPool::connect(&url).await.unwrap();
        let store = PostgresDocumentStore::new(pool);
        store.ensure_schema().await.unwrap();

        let key = DocumentKey::new("test_counters", uuid_like_id());

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert_eq!(first.get(&key).await.unwrap(), None);
        assert_eq!(second.get(&key).await.unwrap(), None);

        first.set(key.clone(), json!({"currentValue": 1}));
        second.set(key.clone(), json!({"currentValue": 1}));
        first.commit().await.unwrap();
        assert!(second.commit().await.unwrap_err().is_conflict());

        let doc = store.read(&key).await.unwrap().unwrap();
        assert_eq!(doc.body, json!({"currentValue": 1}));

        let mut third = store.begin().await.unwrap();
        assert_eq!(third.get(&key).await.unwrap(), Some(json!({"currentValue": 1})));
        third.set(key.clone(), json!({"currentValue": 2}));
        third.commit().await.unwrap();
        assert!(store.read(&key).await.unwrap().unwrap().version > doc.version);
    }

    fn uuid_like_id() -> String {
        format!("k-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
    }
}
