//! Order-number allocator.
//!
//! ```text
//! allocate(company, now)
//!   ↓
//! 1. key = (company, YYYY(now), MM(now))
//!   ↓
//! 2. read counter at key              ┐
//!   ↓                                 │ one optimistic transaction,
//! 3. next = absent ? 1 : current + 1  │ restarted from 2 on conflict
//!   ↓                                 │
//! 4. overwrite counter with next      ┘
//!   ↓
//! 5. OrderNumber(next, MM, YYYY)
//! ```
//!
//! The allocator is stateless between calls: it never caches a counter value
//! and never reads a clock. Anything the caller does with the returned number
//! (writing the order, rendering a PDF, notifying the user) happens strictly
//! after the transaction committed.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use freightdesk_core::{CompanyId, OrderNumber, Period, max_fixed_width_sequence};
use freightdesk_infra::{
    DocumentStore, RetryPolicy, StoreError, StoreTransaction, TransactionBody, TransactionError,
    TransactionRunner,
};

use crate::counter::{CounterKey, CounterRecord};
use crate::error::NumberingError;
use crate::policy::OverflowPolicy;

/// Issues strictly increasing, gap-free order numbers per company and month.
#[derive(Debug, Clone)]
pub struct OrderNumberAllocator<S> {
    runner: TransactionRunner<S>,
    overflow: OverflowPolicy,
}

impl<S> OrderNumberAllocator<S>
where
    S: DocumentStore,
{
    /// Allocator with the default retry budget and [`OverflowPolicy::Widen`].
    pub fn new(store: S) -> Self {
        Self::with_policies(store, RetryPolicy::default(), OverflowPolicy::default())
    }

    pub fn with_policies(store: S, retry: RetryPolicy, overflow: OverflowPolicy) -> Self {
        Self {
            runner: TransactionRunner::new(store, retry),
            overflow,
        }
    }

    pub fn store(&self) -> &S {
        self.runner.store()
    }

    /// Allocate the next order number for `company_id` in the month of `now`.
    ///
    /// `now` is the caller's wall-clock time; it selects the counter and is
    /// stored as `lastUpdated`.
    #[instrument(skip(self), err)]
    pub async fn allocate(
        &self,
        company_id: &str,
        now: DateTime<Utc>,
    ) -> Result<OrderNumber, NumberingError> {
        let company_id = CompanyId::parse(company_id).map_err(|_| NumberingError::MissingTenant)?;
        let period = Period::from_datetime(&now).map_err(NumberingError::InvalidTimestamp)?;
        let key = CounterKey::new(company_id, period);

        let body = AllocateNext {
            key: key.clone(),
            now,
            overflow: self.overflow,
        };

        let sequence = self.runner.run(&body).await.map_err(|err| match err {
            TransactionError::Aborted(e) => e,
            TransactionError::Store(source) => NumberingError::AllocationFailed { source },
        })?;

        let number = OrderNumber::new(sequence, period);
        info!(
            company_id = %key.company_id(),
            sequence,
            order_number = %number,
            "order number allocated"
        );
        Ok(number)
    }

    /// Current counter value for a company and month, without modifying it.
    ///
    /// Returns `0` when nothing has been allocated yet. The value is a
    /// snapshot; it must not be used to predict the next number.
    pub async fn peek(&self, company_id: &str, period: Period) -> Result<u64, NumberingError> {
        let company_id = CompanyId::parse(company_id).map_err(|_| NumberingError::MissingTenant)?;
        let key = CounterKey::new(company_id, period);

        let doc = self
            .runner
            .store()
            .read(&key.document_key())
            .await
            .map_err(|source| NumberingError::StoreUnavailable { source })?;

        match doc {
            None => Ok(0),
            Some(doc) => {
                let record = CounterRecord::from_document(doc.body).map_err(|e| corrupt(&key, e))?;
                Ok(record.current_value)
            }
        }
    }
}

fn corrupt(key: &CounterKey, err: impl ToString) -> NumberingError {
    NumberingError::CorruptCounter {
        key: key.document_key().to_string(),
        reason: err.to_string(),
    }
}

/// Transaction body: read counter, advance, overwrite.
struct AllocateNext {
    key: CounterKey,
    now: DateTime<Utc>,
    overflow: OverflowPolicy,
}

#[async_trait::async_trait]
impl TransactionBody for AllocateNext {
    type Output = u64;
    type Error = NumberingError;

    async fn run(
        &self,
        tx: &mut dyn StoreTransaction,
    ) -> Result<u64, TransactionError<NumberingError>> {
        let doc_key = self.key.document_key();

        let previous = match tx.get(&doc_key).await? {
            Some(body) => Some(
                CounterRecord::from_document(body)
                    .map_err(|e| TransactionError::Aborted(corrupt(&self.key, e)))?,
            ),
            None => None,
        };

        let next = CounterRecord::advance(previous.as_ref(), &self.key, self.now).ok_or_else(|| {
            TransactionError::Aborted(corrupt(&self.key, "counter cannot be incremented further"))
        })?;

        if self.overflow == OverflowPolicy::Reject && next.current_value > max_fixed_width_sequence() {
            return Err(TransactionError::Aborted(NumberingError::Overflow {
                value: next.current_value,
            }));
        }

        let body = next.to_document().map_err(StoreError::from)?;
        tx.set(doc_key, body);
        Ok(next.current_value)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::counter::COUNTERS_COLLECTION;
    use crate::testing::{FailureKind, FlakyStore};
    use freightdesk_infra::{DocumentKey, InMemoryDocumentStore};

    fn april(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, 9, 30, 0).unwrap()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::fixed(5, Duration::ZERO)
    }

    async fn seed_counter(store: &InMemoryDocumentStore, id: &str, value: u64) {
        let mut tx = store.begin().await.unwrap();
        tx.set(
            DocumentKey::new(COUNTERS_COLLECTION, id),
            json!({
                "currentValue": value,
                "companyID": "acme",
                "month": "04",
                "year": "2025",
                "lastUpdated": "2025-04-01T00:00:00Z",
            }),
        );
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn fresh_key_starts_at_0001() {
        let alloc = OrderNumberAllocator::new(InMemoryDocumentStore::new());
        let n = alloc.allocate("acme", april(3)).await.unwrap();

        assert_eq!(n.sequence(), 1);
        assert_eq!(n.sequence_str(), "0001");
        assert_eq!(n.month_str(), "04");
        assert_eq!(n.year_str(), "2025");
        assert_eq!(n.formatted(), "0001/04/2025");
    }

    #[tokio::test]
    async fn sequential_allocations_increase_by_one() {
        let alloc = OrderNumberAllocator::new(InMemoryDocumentStore::new());
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(alloc.allocate("acme", april(3)).await.unwrap().sequence());
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(alloc.peek("acme", Period::new(2025, 4).unwrap()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn seventh_number_formats_as_expected() {
        let store = InMemoryDocumentStore::new();
        seed_counter(&store, "acme_2025_04", 6).await;
        let alloc = OrderNumberAllocator::new(store);

        let n = alloc.allocate("acme", april(10)).await.unwrap();
        assert_eq!(n.formatted(), "0007/04/2025");
        let parts: Vec<String> = n.formatted().split('/').map(str::to_string).collect();
        assert_eq!(parts, vec!["0007", "04", "2025"]);
    }

    #[tokio::test]
    async fn missing_tenant_fails_without_touching_the_store() {
        let store = FlakyStore::new(InMemoryDocumentStore::new());
        let alloc = OrderNumberAllocator::new(store.clone());

        for company in ["", "   "] {
            let err = alloc.allocate(company, april(3)).await.unwrap_err();
            assert!(matches!(err, NumberingError::MissingTenant));
        }
        assert_eq!(store.begin_calls(), 0);
        assert!(store.inner().list(COUNTERS_COLLECTION).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keys_are_isolated_by_company_and_month() {
        let alloc = OrderNumberAllocator::new(InMemoryDocumentStore::new());
        let may = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();

        assert_eq!(alloc.allocate("company-a", april(1)).await.unwrap().sequence(), 1);
        assert_eq!(alloc.allocate("company-a", april(2)).await.unwrap().sequence(), 2);
        assert_eq!(alloc.allocate("company-b", april(2)).await.unwrap().sequence(), 1);
        assert_eq!(alloc.allocate("company-a", may).await.unwrap().formatted(), "0001/05/2025");
        assert_eq!(alloc.allocate("company-a", april(30)).await.unwrap().sequence(), 3);
    }

    #[tokio::test]
    async fn counter_document_has_expected_shape() {
        let store = InMemoryDocumentStore::new();
        let alloc = OrderNumberAllocator::new(store.clone());
        alloc.allocate("acme", april(3)).await.unwrap();

        let doc = store
            .read(&DocumentKey::new(COUNTERS_COLLECTION, "acme_2025_04"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.body["currentValue"], 1);
        assert_eq!(doc.body["companyID"], "acme");
        assert_eq!(doc.body["month"], "04");
        assert_eq!(doc.body["year"], "2025");
        assert_eq!(doc.body["lastUpdated"], "2025-04-03T09:30:00Z");
    }

    #[tokio::test]
    async fn peek_never_changes_the_counter() {
        let store = InMemoryDocumentStore::new();
        let alloc = OrderNumberAllocator::new(store.clone());
        let period = Period::new(2025, 4).unwrap();

        assert_eq!(alloc.peek("acme", period).await.unwrap(), 0);
        alloc.allocate("acme", april(3)).await.unwrap();
        for _ in 0..3 {
            assert_eq!(alloc.peek("acme", period).await.unwrap(), 1);
        }
        assert_eq!(alloc.allocate("acme", april(3)).await.unwrap().sequence(), 2);
    }

    #[tokio::test]
    async fn failed_commit_leaves_counter_unchanged() {
        let inner = InMemoryDocumentStore::new();
        seed_counter(&inner, "acme_2025_04", 41).await;
        let store = FlakyStore::new(inner.clone());
        let alloc = OrderNumberAllocator::with_policies(store.clone(), fast_retry(), OverflowPolicy::Widen);

        store.fail_next_commits(1, FailureKind::Backend);
        let err = alloc.allocate("acme", april(3)).await.unwrap_err();
        assert!(matches!(err, NumberingError::AllocationFailed { .. }), "got {err:?}");
        assert_eq!(alloc.peek("acme", Period::new(2025, 4).unwrap()).await.unwrap(), 41);

        let next = alloc.allocate("acme", april(3)).await.unwrap();
        assert_eq!(next.sequence(), 42);
    }

    #[tokio::test]
    async fn transient_conflicts_are_retried_transparently() {
        let inner = InMemoryDocumentStore::new();
        let store = FlakyStore::new(inner);
        let alloc = OrderNumberAllocator::with_policies(store.clone(), fast_retry(), OverflowPolicy::Widen);

        store.fail_next_commits(3, FailureKind::Conflict);
        assert_eq!(alloc.allocate("acme", april(3)).await.unwrap().sequence(), 1);
        assert_eq!(store.begin_calls(), 4);
        assert_eq!(alloc.allocate("acme", april(3)).await.unwrap().sequence(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_allocation() {
        let store = FlakyStore::new(InMemoryDocumentStore::new());
        let alloc = OrderNumberAllocator::with_policies(store.clone(), fast_retry(), OverflowPolicy::Widen);

        store.fail_next_commits(5, FailureKind::Conflict);
        let err = alloc.allocate("acme", april(3)).await.unwrap_err();
        match err {
            NumberingError::AllocationFailed {
                source: StoreError::RetriesExhausted { attempts, .. },
            } => assert_eq!(attempts, 5),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(alloc.peek("acme", Period::new(2025, 4).unwrap()).await.unwrap(), 0);
        assert_eq!(alloc.allocate("acme", april(3)).await.unwrap().sequence(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_the_allocation() {
        let store = FlakyStore::new(InMemoryDocumentStore::new());
        store.set_unavailable(true);
        let alloc = OrderNumberAllocator::new(store.clone());

        let err = alloc.allocate("acme", april(3)).await.unwrap_err();
        assert!(matches!(
            err,
            NumberingError::AllocationFailed {
                source: StoreError::Backend(_)
            }
        ));
        assert_eq!(err.to_string(), "failed to generate order number");
    }

    #[tokio::test]
    async fn widen_policy_keeps_issuing_past_9999() {
        let store = InMemoryDocumentStore::new();
        seed_counter(&store, "acme_2025_04", 9_999).await;
        let alloc = OrderNumberAllocator::new(store);

        let n = alloc.allocate("acme", april(3)).await.unwrap();
        assert_eq!(n.formatted(), "10000/04/2025");
        assert_eq!(n.formatted().split('/').count(), 3);
    }

    #[tokio::test]
    async fn reject_policy_stops_at_9999_without_writing() {
        let store = InMemoryDocumentStore::new();
        seed_counter(&store, "acme_2025_04", 9_998).await;
        let alloc =
            OrderNumberAllocator::with_policies(store, RetryPolicy::default(), OverflowPolicy::Reject);

        assert_eq!(alloc.allocate("acme", april(3)).await.unwrap().formatted(), "9999/04/2025");
        let err = alloc.allocate("acme", april(3)).await.unwrap_err();
        assert!(matches!(err, NumberingError::Overflow { value: 10_000 }));
        assert_eq!(alloc.peek("acme", Period::new(2025, 4).unwrap()).await.unwrap(), 9_999);
    }

    #[tokio::test]
    async fn corrupt_counter_is_reported_not_overwritten() {
        let store = InMemoryDocumentStore::new();
        let key = DocumentKey::new(COUNTERS_COLLECTION, "acme_2025_04");
        let mut tx = store.begin().await.unwrap();
        tx.set(key.clone(), json!({"currentValue": "seven"}));
        tx.commit().await.unwrap();

        let alloc = OrderNumberAllocator::new(store.clone());
        let err = alloc.allocate("acme", april(3)).await.unwrap_err();
        assert!(matches!(err, NumberingError::CorruptCounter { .. }));
        assert_eq!(
            store.read(&key).await.unwrap().unwrap().body,
            json!({"currentValue": "seven"})
        );
    }
}
