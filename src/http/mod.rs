//! HTTP admission adapter.
//!
//! Extracts the caller's identity from each request, asks the rate limiter
//! whether it may proceed, and answers 429 when it may not.

mod identity;
mod middleware;
mod routes;
mod server;

pub use identity::{api_key, client_ip, is_valid_ip, rate_limit_key, API_KEY_HEADER};
pub use middleware::{
    admission, internal_error_response, log_request, rate_limit_response, ErrorResponse,
    RATE_LIMIT_MESSAGE,
};
pub use routes::routes;
pub use server::{router, HttpServer};
