use axum::{http::StatusCode, response::IntoResponse};

use crate::services::get_metrics;

/// Prometheus metrics in text format.
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
