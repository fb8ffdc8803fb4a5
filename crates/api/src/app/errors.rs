use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use freightdesk_infra::StoreError;
use freightdesk_numbering::NumberingError;
use freightdesk_orders::OrderError;

pub fn order_error_to_response(err: OrderError) -> axum::response::Response {
    match err {
        OrderError::Numbering(e) => numbering_error_to_response(e),
        OrderError::InvalidNumber(e) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_order_number", e.to_string())
        }
        e @ OrderError::NumberTaken { .. } => json_error(StatusCode::CONFLICT, "number_taken", e.to_string()),
        e @ OrderError::NumberCollision { .. } => {
            tracing::warn!(error = %e, "order creation gave up on number collisions");
            json_error(StatusCode::CONFLICT, "number_collision", e.to_string())
        }
        OrderError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
        OrderError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        OrderError::Store(e) => store_error_to_response(e),
    }
}

pub fn numbering_error_to_response(err: NumberingError) -> axum::response::Response {
    match err {
        e @ NumberingError::MissingTenant => json_error(StatusCode::BAD_REQUEST, "missing_company", e.to_string()),
        e @ NumberingError::InvalidTimestamp(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_timestamp", e.to_string())
        }
        e @ NumberingError::AllocationFailed { .. } => {
            tracing::error!(error = ?e, "order number allocation failed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "allocation_failed", e.to_string())
        }
        e @ NumberingError::Overflow { .. } => json_error(StatusCode::CONFLICT, "number_overflow", e.to_string()),
        e @ NumberingError::CorruptCounter { .. } => {
            tracing::error!(error = %e, "corrupt counter document");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "corrupt_counter", e.to_string())
        }
        e @ NumberingError::StoreUnavailable { .. } => {
            tracing::error!(error = ?e, "counter read failed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", e.to_string())
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        e @ StoreError::RetriesExhausted { .. } => json_error(StatusCode::CONFLICT, "conflict", e.to_string()),
        StoreError::Serialization(msg) => {
            tracing::error!(error = %msg, "stored document could not be decoded");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", msg)
        }
        StoreError::Backend(msg) => {
            tracing::error!(error = %msg, "document store failure");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg)
        }
    }
}

/// Malformed or mistyped request bodies keep axum's status code.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(rejection.status(), "invalid_body", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
