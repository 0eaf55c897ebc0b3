#![allow(dead_code)]

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::net::SocketAddr;
use tower::ServiceExt;

use turnstile::http::ErrorResponse;

/// Build a GET request arriving from `remote`, optionally carrying an API key.
pub fn request(path: &str, remote: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(key) = api_key {
        builder = builder.header("API_KEY", key);
    }

    let mut request = builder.body(Body::empty()).unwrap();
    let addr: SocketAddr = remote.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

/// Send a request through the router and return status and body.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

pub fn error_message(body: &[u8]) -> String {
    let response: ErrorResponse = serde_json::from_slice(body).unwrap();
    response.error
}
