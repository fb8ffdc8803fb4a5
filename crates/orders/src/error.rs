use thiserror::Error;

use freightdesk_core::{DomainError, OrderId};
use freightdesk_infra::{StoreError, TransactionError};
use freightdesk_numbering::NumberingError;

#[derive(Debug, Error)]
pub enum OrderError {
    /// Number allocation failed; no order was written.
    #[error(transparent)]
    Numbering(#[from] NumberingError),

    #[error("invalid order number: {0}")]
    InvalidNumber(#[source] DomainError),

    #[error("order number {number} is already used by order {holder}")]
    NumberTaken { number: String, holder: OrderId },

    /// Freshly allocated numbers kept landing on manually assigned ones.
    #[error("no free order number after {attempts} allocations")]
    NumberCollision { attempts: u32 },

    #[error("order not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TransactionError<OrderError>> for OrderError {
    fn from(value: TransactionError<OrderError>) -> Self {
        match value {
            TransactionError::Aborted(e) => e,
            TransactionError::Store(e) => OrderError::Store(e),
        }
    }
}

impl From<DomainError> for OrderError {
    fn from(value: DomainError) -> Self {
        OrderError::Validation(value.to_string())
    }
}
