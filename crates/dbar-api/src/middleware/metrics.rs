//! # Request Metrics
//!
//! Counts every HTTP request by method and status through the `metrics`
//! facade. Whether anything is recorded depends on the installed recorder;
//! the binary installs the Prometheus one and serves it at `/metrics`.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Middleware that increments `dbar_http_requests_total{method,status}`.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_owned();

    let response = next.run(request).await;

    metrics::counter!(
        "dbar_http_requests_total",
        "method" => method,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);

    response
}
