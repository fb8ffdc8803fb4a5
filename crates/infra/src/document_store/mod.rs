//! Transactional document store boundary.
//!
//! This module defines the storage dependency of the numbering and order
//! workflows: documents addressed by `(collection, id)`, read and written inside
//! optimistic transactions that commit all-or-nothing and fail with
//! [`StoreError::Conflict`] when a document they read changed before commit.
//! [`TransactionRunner`] adds the automatic retry on conflict.

pub mod in_memory;
pub mod postgres;
pub mod retry;
pub mod runner;
pub mod r#trait;

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use runner::{TransactionBody, TransactionError, TransactionRunner};
pub use r#trait::{DocumentKey, DocumentStore, StoreError, StoreTransaction, StoredDocument};
