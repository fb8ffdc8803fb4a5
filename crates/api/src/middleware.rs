use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use freightdesk_core::CompanyId;

use crate::app::errors;
use crate::context::CompanyContext;

/// Header carrying the caller's company assignment.
pub const COMPANY_HEADER: &str = "x-company-id";

pub async fn company_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let company_id = extract_company(req.headers()).ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "missing_company",
            "missing company assignment",
        )
    })?;

    req.extensions_mut().insert(CompanyContext::new(company_id));

    Ok(next.run(req).await)
}

fn extract_company(headers: &HeaderMap) -> Option<CompanyId> {
    let header = headers.get(COMPANY_HEADER)?;
    let header = header.to_str().ok()?;
    CompanyId::parse(header).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn company_header_is_trimmed_and_required() {
        let mut headers = HeaderMap::new();
        assert!(extract_company(&headers).is_none());

        headers.insert(COMPANY_HEADER, HeaderValue::from_static("   "));
        assert!(extract_company(&headers).is_none());

        headers.insert(COMPANY_HEADER, HeaderValue::from_static(" acme "));
        assert_eq!(extract_company(&headers).unwrap().as_str(), "acme");
    }
}
