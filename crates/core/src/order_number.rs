//! Order number value object (`NNNN/MM/YYYY`).
//!
//! The formatted string is consumed by display, PDF export and search in the
//! surrounding application, and it is the shape of every number already stored
//! on existing orders, so it must stay byte-for-byte stable:
//!
//! - `NNNN`: sequence, zero-padded to at least [`SEQUENCE_WIDTH`] digits
//! - `MM`: month `01..12`
//! - `YYYY`: four-digit year
//!
//! Sequences above 9999 render with their natural width (`10000/04/2025`);
//! whether such numbers may be issued at all is a numbering policy decision.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::period::Period;
use crate::value_object::ValueObject;

/// Minimum number of digits of the sequence part.
pub const SEQUENCE_WIDTH: usize = 4;

/// An allocated (or manually assigned) order number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "OrderNumberParts", try_from = "OrderNumberParts")]
pub struct OrderNumber {
    // Field order gives chronological ordering: period first, then sequence.
    period: Period,
    sequence: u64,
}

impl OrderNumber {
    pub fn new(sequence: u64, period: Period) -> Self {
        Self { period, sequence }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Zero-padded sequence part, e.g. `"0007"`.
    pub fn sequence_str(&self) -> String {
        format!("{:0width$}", self.sequence, width = SEQUENCE_WIDTH)
    }

    pub fn month_str(&self) -> String {
        self.period.month_str()
    }

    pub fn year_str(&self) -> String {
        self.period.year_str()
    }

    /// Full `NNNN/MM/YYYY` rendering.
    pub fn formatted(&self) -> String {
        self.to_string()
    }

    /// True when the sequence no longer fits the fixed four-digit field.
    pub fn exceeds_fixed_width(&self) -> bool {
        self.sequence > max_fixed_width_sequence()
    }
}

/// Largest sequence that renders in exactly [`SEQUENCE_WIDTH`] digits (9999).
pub const fn max_fixed_width_sequence() -> u64 {
    10u64.pow(SEQUENCE_WIDTH as u32) - 1
}

impl ValueObject for OrderNumber {}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.sequence_str(),
            self.period.month_str(),
            self.period.year_str()
        )
    }
}

impl FromStr for OrderNumber {
    type Err = DomainError;

    /// Strict parse: exactly three `/`-separated parts in canonical form.
    ///
    /// Non-canonical sequences (`"7"`, `"00007"`) are rejected so that parsing
    /// and formatting are exact inverses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let [sequence, month, year] = parts.as_slice() else {
            return Err(DomainError::validation(format!(
                "order number must have the form NNNN/MM/YYYY, got '{s}'"
            )));
        };

        Self::from_parts(sequence, month, year)
    }
}

impl OrderNumber {
    /// Build from the three textual parts as stored on order records.
    pub fn from_parts(sequence: &str, month: &str, year: &str) -> DomainResult<Self> {
        if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "sequence must be numeric, got '{sequence}'"
            )));
        }
        let value: u64 = sequence
            .parse()
            .map_err(|e| DomainError::validation(format!("sequence: {e}")))?;
        if value == 0 {
            return Err(DomainError::validation("sequence must start at 1"));
        }

        let number = Self::new(value, Period::parse_parts(month, year)?);
        if number.sequence_str() != sequence {
            return Err(DomainError::validation(format!(
                "sequence must be zero-padded to {SEQUENCE_WIDTH} digits, got '{sequence}'"
            )));
        }
        Ok(number)
    }
}

/// Wire shape: every part as a string, plus the formatted rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNumberParts {
    pub sequence: String,
    pub month: String,
    pub year: String,
    pub formatted: String,
}

impl From<OrderNumber> for OrderNumberParts {
    fn from(value: OrderNumber) -> Self {
        Self {
            sequence: value.sequence_str(),
            month: value.month_str(),
            year: value.year_str(),
            formatted: value.formatted(),
        }
    }
}

impl TryFrom<OrderNumberParts> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: OrderNumberParts) -> Result<Self, Self::Error> {
        let number = OrderNumber::from_parts(&value.sequence, &value.month, &value.year)?;
        if number.formatted() != value.formatted {
            return Err(DomainError::validation(format!(
                "formatted '{}' does not match parts '{}'",
                value.formatted,
                number.formatted()
            )));
        }
        Ok(number)
    }
}
