use serde::{Deserialize, Serialize};

use freightdesk_core::{CompanyId, Period};
use freightdesk_orders::Order;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideNumberRequest {
    pub order_number: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterResponse {
    pub company_id: String,
    pub year: String,
    pub month: String,
    pub current_value: u64,
}

impl CounterResponse {
    pub fn new(company_id: &CompanyId, period: Period, current_value: u64) -> Self {
        Self {
            company_id: company_id.to_string(),
            year: period.year_str(),
            month: period.month_str(),
            current_value,
        }
    }
}
