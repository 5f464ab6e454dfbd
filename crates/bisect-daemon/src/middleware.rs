// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack for the job broker HTTP API.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RequestId middleware
// ---------------------------------------------------------------------------

/// A unique request identifier, available as an Axum extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Axum middleware that generates a [`RequestId`] for each request and sets
/// the `X-Request-Id` response header.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    resp.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&id.0.to_string()).unwrap(),
    );
    resp
}

// ---------------------------------------------------------------------------
// RequestLogger
// ---------------------------------------------------------------------------

/// Axum middleware that logs method, path, status code, and duration for each
/// request using [`tracing`] structured fields.
pub struct RequestLogger;

impl RequestLogger {
    /// Axum-compatible handler function.
    pub async fn layer(req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let start = Instant::now();

        let resp = next.run(req).await;

        let duration = start.elapsed();
        let status = resp.status().as_u16();

        info!(
            http.method = %method,
            http.path = %path,
            http.status = status,
            http.duration_ms = duration.as_millis() as u64,
            "request completed"
        );

        resp
    }
}

// ---------------------------------------------------------------------------
// CorsConfig
// ---------------------------------------------------------------------------

/// Configuration for CORS headers.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Origins allowed to make cross-origin requests.
    pub allowed_origins: Vec<String>,
    /// HTTP methods allowed in a cross-origin request.
    pub allowed_methods: Vec<String>,
    /// Headers a cross-origin request is allowed to set.
    pub allowed_headers: Vec<String>,
}

impl CorsConfig {
    /// Convert this configuration into a [`tower_http::cors::CorsLayer`].
    pub fn to_cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();

        let methods: Vec<axum::http::Method> = self
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();

        let headers: Vec<axum::http::HeaderName> = self
            .allowed_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(AllowMethods::list(methods))
            .allow_headers(AllowHeaders::list(headers))
    }
}
