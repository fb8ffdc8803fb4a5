//! What to do once a month's sequence outgrows four digits.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Overflow handling for sequences above 9999.
///
/// - `Widen`: keep issuing, rendering the sequence with its natural width
///   (`10000/04/2025`). The three-part `/` format is preserved.
/// - `Reject`: abort the allocation with `NumberingError::Overflow`; the
///   counter stays at 9999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    #[default]
    Widen,
    Reject,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "widen" => Ok(Self::Widen),
            "reject" => Ok(Self::Reject),
            other => Err(format!("overflow policy must be 'widen' or 'reject', got '{other}'")),
        }
    }
}
