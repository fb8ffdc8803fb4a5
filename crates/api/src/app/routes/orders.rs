use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

use freightdesk_core::OrderId;
use freightdesk_orders::OrderDraft;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CompanyContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order).put(update_order))
        .route("/:id/number", put(override_number))
}

fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    payload
        .map(|Json(value)| value)
        .map_err(errors::json_rejection_to_response)
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    payload: Result<Json<OrderDraft>, JsonRejection>,
) -> axum::response::Response {
    let draft = match body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .orders()
        .create_order(company.company_id(), draft, Utc::now())
        .await
    {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
) -> axum::response::Response {
    match services.orders().list_orders(company.company_id()).await {
        Ok(orders) => Json(dto::OrderListResponse { orders }).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders().get_order(company.company_id(), id).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

pub async fn update_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
    payload: Result<Json<OrderDraft>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let draft = match body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .orders()
        .update_order(company.company_id(), id, draft, Utc::now())
        .await
    {
        Ok(order) => Json(order).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}

pub async fn override_number(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(company): Extension<CompanyContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::OverrideNumberRequest>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let request = match body(payload) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .orders()
        .override_number(company.company_id(), id, &request.order_number, Utc::now())
        .await
    {
        Ok(order) => Json(order).into_response(),
        Err(e) => errors::order_error_to_response(e),
    }
}
