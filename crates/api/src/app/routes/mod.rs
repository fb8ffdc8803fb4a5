use axum::Router;

pub mod counters;
pub mod orders;
pub mod system;

/// Router for all company-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/counters", counters::router())
}
