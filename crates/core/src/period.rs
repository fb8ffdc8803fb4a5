//! Numbering period: one calendar month of one year.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Calendar month in which order numbers are issued.
///
/// Order numbers restart at 1 every month, so the period is part of every
/// counter key and of every formatted number (`MM/YYYY`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    year: u16,
    month: u8,
}

impl Period {
    /// Build a period, validating `1..=9999` for the year and `1..=12` for the month.
    pub fn new(year: u16, month: u8) -> DomainResult<Self> {
        if !(1..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "year must have four digits, got {year}"
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!(
                "month must be in 01..12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    /// Derive the period from a wall-clock instant supplied by the caller.
    pub fn from_datetime(now: &DateTime<Utc>) -> DomainResult<Self> {
        let year = u16::try_from(now.year())
            .map_err(|_| DomainError::validation(format!("year out of range: {}", now.year())))?;
        // chrono months are 1-based and always fit in u8.
        Self::new(year, now.month() as u8)
    }

    /// Parse the `MM` and `YYYY` textual parts used in formatted numbers.
    pub fn parse_parts(month: &str, year: &str) -> DomainResult<Self> {
        if month.len() != 2 || !month.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "month must be two digits, got '{month}'"
            )));
        }
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "year must be four digits, got '{year}'"
            )));
        }
        let month: u8 = month
            .parse()
            .map_err(|e| DomainError::validation(format!("month: {e}")))?;
        let year: u16 = year
            .parse()
            .map_err(|e| DomainError::validation(format!("year: {e}")))?;
        Self::new(year, month)
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    /// Four-digit year, e.g. `"2025"`.
    pub fn year_str(&self) -> String {
        format!("{:04}", self.year)
    }

    /// Two-digit zero-padded month, e.g. `"04"`.
    pub fn month_str(&self) -> String {
        format!("{:02}", self.month)
    }
}

impl ValueObject for Period {}

impl core::fmt::Display for Period {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}/{:04}", self.month, self.year)
    }
}
