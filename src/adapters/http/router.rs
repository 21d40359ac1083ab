//! Top-level router: billing routes plus the cross-cutting HTTP layers.

use std::time::Duration;

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::billing::{billing_router, BillingAppState};
use super::middleware::AuthState;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Builds the full application.
pub fn app_router(state: BillingAppState, validator: AuthState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(billing_router(validator))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
                ),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn not_found() -> (StatusCode, Json<super::error::ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(super::error::ErrorResponse::new("NOT_FOUND", "No such route")),
    )
}
