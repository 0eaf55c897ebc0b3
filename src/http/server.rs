//! HTTP server implementation.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{admission, log_request};
use super::routes::routes;
use crate::error::Result;
use crate::ratelimit::RateLimiter;
use crate::storage::Storage;

/// Build the application router with admission control in front of every
/// route.
pub fn router<S: Storage + 'static>(limiter: Arc<RateLimiter<S>>) -> Router {
    routes()
        .layer(middleware::from_fn(log_request))
        .layer(middleware::from_fn_with_state(limiter, admission::<S>))
}

/// HTTP server for the admission-controlled service.
pub struct HttpServer<S: Storage + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter<S>>,
}

impl<S: Storage + 'static> HttpServer<S> {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter<S>>) -> Self {
        Self { addr, rate_limiter }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        let app = router(self.rate_limiter);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            e.into()
        })
    }
}
