//! Demo endpoints served behind the admission middleware.

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use super::identity::{api_key, client_ip};
use super::middleware::remote_addr;

/// Routes exposed by the service.
pub fn routes() -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/api/test", get(api_test_handler))
        .route("/api/load-test", get(load_test_handler))
}

async fn home_handler() -> impl IntoResponse {
    Json(json!({
        "message": "Rate limiter is working",
        "path": "/",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn api_test_handler(request: Request) -> impl IntoResponse {
    Json(json!({
        "message": "API endpoint accessed",
        "api_key": api_key(request.headers()),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn load_test_handler(request: Request) -> impl IntoResponse {
    Json(json!({
        "message": "Load test endpoint",
        "client_ip": client_ip(request.headers(), remote_addr(&request)),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
