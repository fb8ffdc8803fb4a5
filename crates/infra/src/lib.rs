//! Infrastructure layer: transactional document storage (in-memory, Postgres)
//! and the conflict-retrying transaction runner.

pub mod document_store;

pub use document_store::{
    DocumentKey, DocumentStore, InMemoryDocumentStore, PostgresDocumentStore, RetryPolicy,
    StoreError, StoreTransaction, StoredDocument, TransactionBody, TransactionError,
    TransactionRunner,
};
