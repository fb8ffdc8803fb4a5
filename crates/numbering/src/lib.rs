//! Sequential order-number allocation.
//!
//! Order numbers are issued per company per calendar month (`NNNN/MM/YYYY`).
//! Each allocation is one optimistic read-modify-write of a counter document,
//! retried on conflict, so concurrent callers in independent sessions never
//! receive the same number and never leave a gap.

pub mod allocator;
pub mod counter;
pub mod error;
pub mod policy;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use allocator::OrderNumberAllocator;
pub use counter::{COUNTERS_COLLECTION, CounterKey, CounterRecord};
pub use error::NumberingError;
pub use policy::OverflowPolicy;
