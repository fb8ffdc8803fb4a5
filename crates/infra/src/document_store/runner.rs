//! Retrying transaction runner.
//!
//! The runner owns the "retry on write conflict" half of the storage contract:
//!
//! ```text
//! loop {
//!   begin
//!     body: reads + pure decision + buffered writes
//!   commit
//!     Ok            -> return output
//!     Conflict      -> back off, start over from the first read
//!     other error   -> fail
//! }
//! ```
//!
//! A body runs once per attempt and must be free of side effects other than
//! its calls on the transaction: anything it does outside the store would be
//! repeated on every retry.

use thiserror::Error;
use tracing::{debug, warn};

use super::r#trait::{DocumentStore, StoreError, StoreTransaction};
use super::retry::RetryPolicy;

/// Work executed inside one transaction attempt.
#[async_trait::async_trait]
pub trait TransactionBody: Send + Sync {
    type Output: Send;
    /// Domain reason to abort without committing.
    type Error: Send;

    async fn run(
        &self,
        tx: &mut dyn StoreTransaction,
    ) -> Result<Self::Output, TransactionError<Self::Error>>;
}

/// Outcome of a failed [`TransactionRunner::run`].
#[derive(Debug, Error)]
pub enum TransactionError<E> {
    /// The body decided to abort; nothing was written.
    #[error("transaction aborted")]
    Aborted(E),

    /// The store failed, or conflicts outlasted the retry budget.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs [`TransactionBody`]s against a store, retrying on conflict.
#[derive(Debug, Clone)]
pub struct TransactionRunner<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S> TransactionRunner<S>
where
    S: DocumentStore,
{
    pub fn new(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<B>(&self, body: &B) -> Result<B::Output, TransactionError<B::Error>>
    where
        B: TransactionBody,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let mut tx = self.store.begin().await?;
            // An abort drops `tx`, discarding its buffered writes.
            let output = body.run(tx.as_mut()).await?;

            match tx.commit().await {
                Ok(()) => {
                    if attempts > 1 {
                        debug!(attempts, "transaction committed after retry");
                    }
                    return Ok(output);
                }
                Err(err) if err.is_conflict() => {
                    if !self.policy.should_retry(attempts) {
                        warn!(attempts, error = %err, "transaction retries exhausted");
                        return Err(StoreError::RetriesExhausted {
                            attempts,
                            last: Box::new(err),
                        }
                        .into());
                    }
                    let delay = self.policy.delay_for_attempt(attempts);
                    debug!(attempts, delay_ms = delay.as_millis() as u64, error = %err, "transaction conflict, retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
