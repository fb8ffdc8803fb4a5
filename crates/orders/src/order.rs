use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use freightdesk_core::{CompanyId, DomainError, DomainResult, Entity, OrderId, OrderNumber};
use freightdesk_infra::DocumentKey;

/// Collection holding one document per order, keyed by [`OrderId`].
pub const ORDERS_COLLECTION: &str = "orders";

/// User-editable freight details of an order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub customer: String,
    #[serde(default)]
    pub carrier: String,
    #[serde(default)]
    pub loading_places: Vec<String>,
    #[serde(default)]
    pub unloading_places: Vec<String>,
    /// Price in smallest currency unit (e.g., cents).
    #[serde(default)]
    pub freight_price: Option<u64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub notes: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

impl OrderDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.customer.trim().is_empty() {
            return Err(DomainError::validation("customer must not be empty"));
        }
        if self
            .loading_places
            .iter()
            .chain(&self.unloading_places)
            .any(|p| p.trim().is_empty())
        {
            return Err(DomainError::validation("places must not be empty"));
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency must be a three-letter ISO code, got '{}'",
                self.currency
            )));
        }
        Ok(())
    }
}

/// A transport order holding exactly one order number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "OrderDocument", try_from = "OrderDocument")]
pub struct Order {
    id: OrderId,
    company_id: CompanyId,
    number: OrderNumber,
    details: OrderDraft,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: OrderId,
        company_id: CompanyId,
        number: OrderNumber,
        details: OrderDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            company_id,
            number,
            details,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn number(&self) -> OrderNumber {
        self.number
    }

    pub fn details(&self) -> &OrderDraft {
        &self.details
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn belongs_to(&self, company_id: &CompanyId) -> bool {
        &self.company_id == company_id
    }

    /// Replace the freight details. The number is never touched here.
    pub fn edit(&mut self, details: OrderDraft, now: DateTime<Utc>) {
        self.details = details;
        self.updated_at = now;
    }

    pub fn renumber(&mut self, number: OrderNumber, now: DateTime<Utc>) {
        self.number = number;
        self.updated_at = now;
    }

    pub fn document_key(&self) -> DocumentKey {
        document_key(self.id)
    }

    pub fn from_document(body: JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(body)
    }

    pub fn to_document(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

pub fn document_key(id: OrderId) -> DocumentKey {
    DocumentKey::new(ORDERS_COLLECTION, id.to_string())
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn company_id(&self) -> &CompanyId {
        &self.company_id
    }
}

/// Persisted and wire shape of an order.
///
/// The number is stored both formatted and split into its parts, the way
/// existing order documents carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDocument {
    id: OrderId,
    #[serde(rename = "companyID")]
    company_id: CompanyId,
    order_number: String,
    sequence: String,
    month: String,
    year: String,
    #[serde(flatten)]
    details: OrderDraft,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Order> for OrderDocument {
    fn from(value: Order) -> Self {
        Self {
            id: value.id,
            company_id: value.company_id,
            order_number: value.number.formatted(),
            sequence: value.number.sequence_str(),
            month: value.number.month_str(),
            year: value.number.year_str(),
            details: value.details,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl TryFrom<OrderDocument> for Order {
    type Error = DomainError;

    fn try_from(doc: OrderDocument) -> Result<Self, Self::Error> {
        let number = OrderNumber::from_parts(&doc.sequence, &doc.month, &doc.year)?;
        if number.formatted() != doc.order_number {
            return Err(DomainError::validation(format!(
                "orderNumber '{}' does not match its parts '{}'",
                doc.order_number, number
            )));
        }
        Ok(Self {
            id: doc.id,
            company_id: doc.company_id,
            number,
            details: doc.details,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use freightdesk_core::Period;

    fn draft() -> OrderDraft {
        OrderDraft {
            customer: "Baltic Timber".into(),
            carrier: "Nordline".into(),
            loading_places: vec!["Riga".into()],
            unloading_places: vec!["Hamburg".into(), "Bremen".into()],
            freight_price: Some(125_000),
            currency: "EUR".into(),
            notes: String::new(),
        }
    }

    fn order() -> Order {
        let now = Utc.with_ymd_and_hms(2025, 4, 3, 10, 0, 0).unwrap();
        Order::new(
            OrderId::new(),
            CompanyId::parse("acme").unwrap(),
            OrderNumber::new(7, Period::new(2025, 4).unwrap()),
            draft(),
            now,
        )
    }

    #[test]
    fn document_carries_formatted_and_split_number() {
        let doc = order().to_document().unwrap();
        assert_eq!(doc["orderNumber"], "0007/04/2025");
        assert_eq!(doc["sequence"], "0007");
        assert_eq!(doc["month"], "04");
        assert_eq!(doc["year"], "2025");
        assert_eq!(doc["companyID"], "acme");
        assert_eq!(doc["loadingPlaces"][0], "Riga");
        assert_eq!(doc["freightPrice"], 125_000);
    }

    #[test]
    fn document_round_trips() {
        let o = order();
        assert_eq!(Order::from_document(o.to_document().unwrap()).unwrap(), o);
    }

    #[test]
    fn inconsistent_number_parts_are_rejected() {
        let mut doc = order().to_document().unwrap();
        doc["orderNumber"] = "0008/04/2025".into();
        assert!(Order::from_document(doc).is_err());
    }

    #[test]
    fn edit_keeps_number() {
        let mut o = order();
        let later = o.created_at() + chrono::Duration::hours(1);
        let mut d = draft();
        d.customer = "Other".into();
        o.edit(d, later);
        assert_eq!(o.number().formatted(), "0007/04/2025");
        assert_eq!(o.details().customer, "Other");
        assert_eq!(o.updated_at(), later);
    }

    #[test]
    fn draft_validation() {
        assert!(draft().validate().is_ok());

        let mut d = draft();
        d.customer = "  ".into();
        assert!(d.validate().is_err());

        let mut d = draft();
        d.unloading_places.push(String::new());
        assert!(d.validate().is_err());

        let mut d = draft();
        d.currency = "eur".into();
        assert!(d.validate().is_err());
    }

    #[test]
    fn draft_defaults_from_minimal_json() {
        let d: OrderDraft = serde_json::from_value(serde_json::json!({"customer": "X"})).unwrap();
        assert_eq!(d.currency, "EUR");
        assert!(d.loading_places.is_empty());
        assert_eq!(d.freight_price, None);
    }
}
