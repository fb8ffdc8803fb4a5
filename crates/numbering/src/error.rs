//! Numbering error model.

use thiserror::Error;

use freightdesk_core::DomainError;
use freightdesk_infra::StoreError;

/// Order-number allocation error.
///
/// Every variant leaves the counter untouched: either the transaction never
/// started, it was aborted before commit, or its commit failed as a whole.
#[derive(Debug, Error)]
pub enum NumberingError {
    /// No company id supplied (caller configuration / session error).
    #[error("missing company assignment")]
    MissingTenant,

    /// The caller-supplied timestamp cannot be mapped to a `MM/YYYY` period.
    #[error("invalid allocation timestamp: {0}")]
    InvalidTimestamp(#[source] DomainError),

    /// The counter transaction could not commit (store unavailable, or
    /// conflicts outlasted the retry budget).
    #[error("failed to generate order number")]
    AllocationFailed {
        #[source]
        source: StoreError,
    },

    /// The next sequence does not fit the four-digit field and the overflow
    /// policy rejects wider numbers.
    #[error("order number sequence {value} exceeds the four-digit field")]
    Overflow { value: u64 },

    /// The stored counter document cannot be interpreted.
    #[error("counter document {key} is corrupt: {reason}")]
    CorruptCounter { key: String, reason: String },

    /// A read-only lookup failed.
    #[error("counter store unavailable")]
    StoreUnavailable {
        #[source]
        source: StoreError,
    },
}
