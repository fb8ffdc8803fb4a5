//! Number claims: which order holds a given order number.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use freightdesk_core::{CompanyId, OrderId, OrderNumber};
use freightdesk_infra::DocumentKey;

pub const ORDER_NUMBERS_COLLECTION: &str = "order_numbers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberClaim {
    #[serde(rename = "companyID")]
    pub company_id: CompanyId,
    pub order_id: OrderId,
    pub order_number: String,
}

impl NumberClaim {
    pub fn new(company_id: CompanyId, order_id: OrderId, number: OrderNumber) -> Self {
        Self {
            company_id,
            order_id,
            order_number: number.formatted(),
        }
    }

    pub fn from_document(body: JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(body)
    }

    pub fn to_document(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// `order_numbers/{company}_{YYYY}_{MM}_{NNNN}`.
pub fn claim_key(company_id: &CompanyId, number: OrderNumber) -> DocumentKey {
    DocumentKey::new(
        ORDER_NUMBERS_COLLECTION,
        format!(
            "{}_{}_{}_{}",
            company_id,
            number.year_str(),
            number.month_str(),
            number.sequence_str()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightdesk_core::Period;

    #[test]
    fn claim_key_is_scoped_by_company_and_period() {
        let acme = CompanyId::parse("acme").unwrap();
        let n = OrderNumber::new(7, Period::new(2025, 4).unwrap());
        assert_eq!(claim_key(&acme, n).id(), "acme_2025_04_0007");
        assert_eq!(claim_key(&acme, n).collection(), ORDER_NUMBERS_COLLECTION);

        let other = CompanyId::parse("other").unwrap();
        assert_ne!(claim_key(&acme, n), claim_key(&other, n));
    }
}
