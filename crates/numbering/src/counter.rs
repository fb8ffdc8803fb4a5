//! Counter documents backing order-number allocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use freightdesk_core::{CompanyId, Period};
use freightdesk_infra::DocumentKey;

/// Collection holding one counter document per company and month.
pub const COUNTERS_COLLECTION: &str = "counters";

/// Identity of one counter: `(company, year, month)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    company_id: CompanyId,
    period: Period,
}

impl CounterKey {
    pub fn new(company_id: CompanyId, period: Period) -> Self {
        Self { company_id, period }
    }

    pub fn company_id(&self) -> &CompanyId {
        &self.company_id
    }

    pub fn period(&self) -> Period {
        self.period
    }

    /// Document id `{company}_{YYYY}_{MM}`.
    ///
    /// The `_YYYY_MM` suffix has a fixed width of eight characters, so the id
    /// maps back to exactly one key even when the company id contains `_`.
    pub fn document_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.company_id,
            self.period.year_str(),
            self.period.month_str()
        )
    }

    pub fn document_key(&self) -> DocumentKey {
        DocumentKey::new(COUNTERS_COLLECTION, self.document_id())
    }
}

/// Persisted counter state.
///
/// `current_value` is the number of order numbers issued so far for the key;
/// the last issued number is `current_value` itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRecord {
    pub current_value: u64,
    #[serde(rename = "companyID")]
    pub company_id: String,
    pub month: String,
    pub year: String,
    pub last_updated: DateTime<Utc>,
}

impl CounterRecord {
    /// The only two transitions: `absent -> 1` and `n -> n + 1`.
    ///
    /// Returns `None` when `n + 1` does not fit in `u64`.
    pub fn advance(
        previous: Option<&CounterRecord>,
        key: &CounterKey,
        now: DateTime<Utc>,
    ) -> Option<CounterRecord> {
        let current_value = match previous {
            None => 1,
            Some(p) => p.current_value.checked_add(1)?,
        };

        Some(CounterRecord {
            current_value,
            company_id: key.company_id().to_string(),
            month: key.period().month_str(),
            year: key.period().year_str(),
            last_updated: now,
        })
    }

    pub fn from_document(body: JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(body)
    }

    pub fn to_document(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(company: &str, year: u16, month: u8) -> CounterKey {
        CounterKey::new(CompanyId::parse(company).unwrap(), Period::new(year, month).unwrap())
    }

    #[test]
    fn document_id_is_company_year_month() {
        assert_eq!(key("acme", 2025, 4).document_id(), "acme_2025_04");
        assert_eq!(key("acme", 2025, 4).document_key().collection(), COUNTERS_COLLECTION);
    }

    #[test]
    fn underscores_in_company_ids_do_not_collide() {
        let a = key("a_2025", 2024, 1).document_id();
        let b = key("a", 2025, 1).document_id();
        assert_ne!(a, b);
    }

    #[test]
    fn first_advance_starts_at_one_then_increments() {
        let k = key("acme", 2025, 4);
        let now = Utc.with_ymd_and_hms(2025, 4, 3, 8, 0, 0).unwrap();

        let first = CounterRecord::advance(None, &k, now).unwrap();
        assert_eq!(first.current_value, 1);
        assert_eq!(first.month, "04");
        assert_eq!(first.year, "2025");
        assert_eq!(first.company_id, "acme");

        let second = CounterRecord::advance(Some(&first), &k, now).unwrap();
        assert_eq!(second.current_value, 2);
    }

    #[test]
    fn advance_refuses_to_wrap() {
        let k = key("acme", 2025, 4);
        let now = Utc::now();
        let mut rec = CounterRecord::advance(None, &k, now).unwrap();
        rec.current_value = u64::MAX;
        assert!(CounterRecord::advance(Some(&rec), &k, now).is_none());
    }

    #[test]
    fn document_shape_uses_wire_field_names() {
        let k = key("acme", 2025, 4);
        let now = Utc.with_ymd_and_hms(2025, 4, 3, 8, 0, 0).unwrap();
        let doc = CounterRecord::advance(None, &k, now).unwrap().to_document().unwrap();

        let obj = doc.as_object().unwrap();
        let mut fields: Vec<&str> = obj.keys().map(String::as_str).collect();
        fields.sort();
        assert_eq!(fields, vec!["companyID", "currentValue", "lastUpdated", "month", "year"]);
        assert_eq!(obj["currentValue"], 1);
        assert_eq!(obj["companyID"], "acme");
    }
}
