//! `freightdesk-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! tenant and order identifiers, numbering periods and the `NNNN/MM/YYYY`
//! order number format.

pub mod entity;
pub mod error;
pub mod id;
pub mod order_number;
pub mod period;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CompanyId, OrderId};
pub use order_number::{max_fixed_width_sequence, OrderNumber, OrderNumberParts, SEQUENCE_WIDTH};
pub use period::Period;
pub use value_object::ValueObject;
