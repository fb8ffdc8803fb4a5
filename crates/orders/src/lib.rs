//! Transport orders and their order numbers.
//!
//! Orders receive their number from [`freightdesk_numbering`] when they are
//! created. Every number held by an order is also recorded as a *claim*
//! document, written in the same transaction as the order, so that a number
//! is held by at most one order per company even when users edit numbers by
//! hand.

pub mod claim;
pub mod error;
pub mod order;
pub mod service;

pub use claim::{NumberClaim, ORDER_NUMBERS_COLLECTION};
pub use error::OrderError;
pub use order::{ORDERS_COLLECTION, Order, OrderDraft};
pub use service::OrderService;
