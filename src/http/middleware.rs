//! Admission middleware.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::identity::{api_key, client_ip, rate_limit_key};
use crate::ratelimit::RateLimiter;
use crate::storage::Storage;

/// Message returned to callers that exceeded their rate limit.
pub const RATE_LIMIT_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// 429 response sent when a request is denied.
pub fn rate_limit_response() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorResponse::new(RATE_LIMIT_MESSAGE)),
    )
        .into_response()
}

/// 500 response sent when the decision could not be made.
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal server error")),
    )
        .into_response()
}

/// Peer address recorded by `into_make_service_with_connect_info`.
pub(crate) fn remote_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Let a request through only when the rate limiter admits its identity.
pub async fn admission<S: Storage + 'static>(
    State(limiter): State<Arc<RateLimiter<S>>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), remote_addr(&request));
    let (key, is_token) = rate_limit_key(&ip, api_key(request.headers()));

    match limiter.check_rate_limit(&key, is_token).await {
        Ok(true) => next.run(request).await,
        Ok(false) => {
            debug!(key = %key, "Request rejected by rate limiter");
            rate_limit_response()
        }
        Err(e) => {
            error!(key = %key, error = %e, "Rate limit check failed");
            internal_error_response()
        }
    }
}

/// Log every request with its outcome and latency.
pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = client_ip(request.headers(), remote_addr(&request));
    let has_api_key = api_key(request.headers()).is_some();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        client = %client,
        api_key = has_api_key,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request handled"
    );

    response
}
