use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use freightdesk_core::Period;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CompanyContext;

pub fn router() -> Router {
    Router::new().route("/:year/:month", get(get_counter))
}

/// Current counter value for one month. Read-only.
pub async fn get_counter(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path((year, month)): Path<(String, String)>,
) -> axum::response::Response {
    let period = match parse_period(&year, &month) {
        Some(p) => p,
        None => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_period",
                "expected /counters/YYYY/MM",
            );
        }
    };

    match services
        .allocator()
        .peek(company.company_id().as_str(), period)
        .await
    {
        Ok(value) => Json(dto::CounterResponse::new(company.company_id(), period, value)).into_response(),
        Err(e) => errors::numbering_error_to_response(e),
    }
}

/// Accepts `2025/4` as well as `2025/04`.
fn parse_period(year: &str, month: &str) -> Option<Period> {
    let year: u16 = year.parse().ok()?;
    let month: u8 = month.parse().ok()?;
    Period::new(year, month).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_path_parsing() {
        assert_eq!(parse_period("2025", "04"), Period::new(2025, 4).ok());
        assert_eq!(parse_period("2025", "4"), Period::new(2025, 4).ok());
        assert!(parse_period("2025", "13").is_none());
        assert!(parse_period("twenty", "04").is_none());
    }
}
