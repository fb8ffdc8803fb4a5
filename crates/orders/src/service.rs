//! Order workflow on top of the document store.
//!
//! | Operation         | Allocator | Transaction reads        | Transaction writes              |
//! |-------------------|-----------|--------------------------|---------------------------------|
//! | `create_order`    | yes       | claim of the new number  | order, claim                    |
//! | `update_order`    | no        | order                    | order                           |
//! | `override_number` | no        | order, old + new claim   | order, new claim, (old claim ×) |
//!
//! Allocation and the order write are separate transactions: a crash between
//! them leaves an unused number, never a duplicate.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use freightdesk_core::{CompanyId, Entity, OrderId, OrderNumber};
use freightdesk_infra::{
    DocumentStore, RetryPolicy, StoreError, StoreTransaction, TransactionBody, TransactionError,
    TransactionRunner,
};
use freightdesk_numbering::OrderNumberAllocator;

use crate::claim::{NumberClaim, claim_key};
use crate::error::OrderError;
use crate::order::{self, ORDERS_COLLECTION, Order, OrderDraft};

const DEFAULT_MAX_NUMBER_COLLISIONS: u32 = 3;

#[derive(Debug, Clone)]
pub struct OrderService<S> {
    allocator: OrderNumberAllocator<S>,
    runner: TransactionRunner<S>,
    max_number_collisions: u32,
}

impl<S> OrderService<S>
where
    S: DocumentStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self::with_allocator(OrderNumberAllocator::new(store), RetryPolicy::default())
    }

    /// Service sharing the allocator's store; `retry` applies to order writes.
    pub fn with_allocator(allocator: OrderNumberAllocator<S>, retry: RetryPolicy) -> Self {
        let runner = TransactionRunner::new(allocator.store().clone(), retry);
        Self {
            allocator,
            runner,
            max_number_collisions: DEFAULT_MAX_NUMBER_COLLISIONS,
        }
    }

    pub fn with_max_number_collisions(mut self, max: u32) -> Self {
        self.max_number_collisions = max.max(1);
        self
    }

    pub fn allocator(&self) -> &OrderNumberAllocator<S> {
        &self.allocator
    }

    /// Allocate a number and persist a new order holding it.
    #[instrument(skip(self, draft), fields(company_id = %company_id), err)]
    pub async fn create_order(
        &self,
        company_id: &CompanyId,
        draft: OrderDraft,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        draft.validate()?;
        let id = OrderId::new();

        for attempt in 1..=self.max_number_collisions {
            let number = self.allocator.allocate(company_id.as_str(), now).await?;
            let body = InsertOrder {
                order: Order::new(id, company_id.clone(), number, draft.clone(), now),
            };

            match self.runner.run(&body).await.map_err(OrderError::from) {
                Ok(order) => {
                    info!(order_id = %id, order_number = %number, "order created");
                    return Ok(order);
                }
                Err(OrderError::NumberTaken { number, holder }) => {
                    warn!(attempt, %number, %holder, "allocated number already held, allocating again");
                }
                Err(e) => return Err(e),
            }
        }

        Err(OrderError::NumberCollision {
            attempts: self.max_number_collisions,
        })
    }

    /// Replace the freight details of an order, keeping its number.
    pub async fn update_order(
        &self,
        company_id: &CompanyId,
        id: OrderId,
        draft: OrderDraft,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        draft.validate()?;
        let body = UpdateOrder {
            company_id: company_id.clone(),
            id,
            draft,
            now,
        };
        Ok(self.runner.run(&body).await?)
    }

    /// Assign a hand-typed number to an existing order.
    ///
    /// The counter is not touched. A number held by another order of the same
    /// company is refused.
    #[instrument(skip(self), fields(company_id = %company_id), err)]
    pub async fn override_number(
        &self,
        company_id: &CompanyId,
        id: OrderId,
        formatted: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let number: OrderNumber = formatted.trim().parse().map_err(OrderError::InvalidNumber)?;
        let body = OverrideNumber {
            company_id: company_id.clone(),
            id,
            number,
            now,
        };
        let order = self.runner.run(&body).await?;
        info!(order_id = %id, order_number = %number, "order number overridden");
        Ok(order)
    }

    pub async fn get_order(&self, company_id: &CompanyId, id: OrderId) -> Result<Order, OrderError> {
        let doc = self
            .runner
            .store()
            .read(&order::document_key(id))
            .await?
            .ok_or(OrderError::NotFound)?;
        let order = Order::from_document(doc.body).map_err(StoreError::from)?;
        if !order.belongs_to(company_id) {
            return Err(OrderError::NotFound);
        }
        Ok(order)
    }

    /// Orders of one company, by year, month and sequence.
    pub async fn list_orders(&self, company_id: &CompanyId) -> Result<Vec<Order>, OrderError> {
        let docs = self.runner.store().list(ORDERS_COLLECTION).await?;

        let mut orders = Vec::new();
        for doc in docs {
            let order = Order::from_document(doc.body).map_err(StoreError::from)?;
            if order.belongs_to(company_id) {
                orders.push(order);
            }
        }
        orders.sort_by(|a, b| {
            a.number()
                .cmp(&b.number())
                .then_with(|| a.created_at().cmp(&b.created_at()))
        });
        Ok(orders)
    }
}

async fn read_order(
    tx: &mut dyn StoreTransaction,
    company_id: &CompanyId,
    id: OrderId,
) -> Result<Order, TransactionError<OrderError>> {
    let body = tx
        .get(&order::document_key(id))
        .await?
        .ok_or(TransactionError::Aborted(OrderError::NotFound))?;
    let order = Order::from_document(body).map_err(StoreError::from)?;
    if !order.belongs_to(company_id) {
        return Err(TransactionError::Aborted(OrderError::NotFound));
    }
    Ok(order)
}

async fn read_claim(
    tx: &mut dyn StoreTransaction,
    company_id: &CompanyId,
    number: OrderNumber,
) -> Result<Option<NumberClaim>, TransactionError<OrderError>> {
    match tx.get(&claim_key(company_id, number)).await? {
        Some(body) => Ok(Some(NumberClaim::from_document(body).map_err(StoreError::from)?)),
        None => Ok(None),
    }
}

fn write_order(tx: &mut dyn StoreTransaction, order: &Order) -> Result<(), StoreError> {
    let claim = NumberClaim::new(order.company_id().clone(), *order.id(), order.number());
    tx.set(order.document_key(), order.to_document()?);
    tx.set(claim_key(order.company_id(), order.number()), claim.to_document()?);
    Ok(())
}

struct InsertOrder {
    order: Order,
}

#[async_trait::async_trait]
impl TransactionBody for InsertOrder {
    type Output = Order;
    type Error = OrderError;

    async fn run(&self, tx: &mut dyn StoreTransaction) -> Result<Order, TransactionError<OrderError>> {
        if let Some(claim) = read_claim(tx, self.order.company_id(), self.order.number()).await? {
            return Err(TransactionError::Aborted(OrderError::NumberTaken {
                number: claim.order_number,
                holder: claim.order_id,
            }));
        }
        write_order(tx, &self.order)?;
        Ok(self.order.clone())
    }
}

struct UpdateOrder {
    company_id: CompanyId,
    id: OrderId,
    draft: OrderDraft,
    now: DateTime<Utc>,
}

#[async_trait::async_trait]
impl TransactionBody for UpdateOrder {
    type Output = Order;
    type Error = OrderError;

    async fn run(&self, tx: &mut dyn StoreTransaction) -> Result<Order, TransactionError<OrderError>> {
        let mut order = read_order(tx, &self.company_id, self.id).await?;
        order.edit(self.draft.clone(), self.now);
        tx.set(order.document_key(), order.to_document().map_err(StoreError::from)?);
        Ok(order)
    }
}

struct OverrideNumber {
    company_id: CompanyId,
    id: OrderId,
    number: OrderNumber,
    now: DateTime<Utc>,
}

#[async_trait::async_trait]
impl TransactionBody for OverrideNumber {
    type Output = Order;
    type Error = OrderError;

    async fn run(&self, tx: &mut dyn StoreTransaction) -> Result<Order, TransactionError<OrderError>> {
        let mut order = read_order(tx, &self.company_id, self.id).await?;
        let previous = order.number();
        if previous == self.number {
            return Ok(order);
        }

        if let Some(claim) = read_claim(tx, &self.company_id, self.number).await? {
            if claim.order_id != self.id {
                return Err(TransactionError::Aborted(OrderError::NumberTaken {
                    number: claim.order_number,
                    holder: claim.order_id,
                }));
            }
        }

        // Release the old number only if this order actually holds it.
        if let Some(old) = read_claim(tx, &self.company_id, previous).await? {
            if old.order_id == self.id {
                tx.delete(claim_key(&self.company_id, previous));
            }
        }

        order.renumber(self.number, self.now);
        write_order(tx, &order)?;
        Ok(order)
    }
}
