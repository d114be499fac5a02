pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use axum::{
    extract::State,
    http::{HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, rate_limit::ip_rate_limit_middleware,
    rate_limit::IpRateLimiter, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::FinanceConfig;
use crate::services::{ConnectionService, Database, PlaidApi, TokenVerifier};

#[derive(Clone)]
pub struct AppState {
    pub config: FinanceConfig,
    pub db: Arc<Database>,
    pub plaid: Arc<dyn PlaidApi>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub connections: ConnectionService,
    pub ip_rate_limiter: IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Everything under /api/plaid requires a verified bearer identity; the
    // user id from the token scopes every query.
    let api_routes = Router::new()
        .route("/api/plaid/link-token", post(handlers::link::create_link_token))
        .route(
            "/api/plaid/link-token/update",
            post(handlers::link::create_update_link_token),
        )
        .route("/api/plaid/exchange-token", post(handlers::link::exchange_token))
        .route(
            "/api/plaid/connections",
            get(handlers::connections::list_connections),
        )
        .route("/api/plaid/refresh", post(handlers::connections::refresh))
        .route("/api/plaid/disconnect", post(handlers::connections::disconnect))
        .route(
            "/api/plaid/transactions",
            get(handlers::transactions::recent_transactions),
        )
        .route("/api/plaid/accounts", get(handlers::accounts::list_accounts))
        .route(
            "/api/plaid/investments",
            get(handlers::investments::list_holdings),
        )
        .route(
            "/api/plaid/spending-summary",
            get(handlers::spending::spending_summary),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .merge(api_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                HeaderValue::from_static("*")
                            })
                        })
                        .collect::<Vec<HeaderValue>>(),
                )
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        );

    Ok(app)
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": {
            "postgres": "up"
        }
    })))
}

/// Readiness check for orchestrator probes.
pub async fn readiness_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ready" }))
}
