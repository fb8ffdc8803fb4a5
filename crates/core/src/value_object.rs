//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. In this
/// domain a [`Period`](crate::Period) or an [`OrderNumber`](crate::OrderNumber)
/// is a value object: two order numbers with the same sequence, month and year
/// are the same number, regardless of which order carries them.
///
/// ```ignore
/// let a: OrderNumber = "0007/04/2025".parse()?;
/// let b = OrderNumber::new(7, Period::new(2025, 4)?);
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
