//! # dbar-api: DonationBar HTTP Service
//!
//! Axum service around the ECPay integrity core.
//!
//! ## API Surface
//!
//! | Route | Module | Auth |
//! |---|---|---|
//! | `/ecpay/return`, `/ecpay/result`, `/webhook/*` | [`routes::ecpay`] | gateway signature / encryption |
//! | `/create-order[/{tenant}]` | [`routes::checkout`] | none |
//! | `/progress[/{tenant}]`, `/events[/{tenant}]` | [`routes::progress`] | none |
//! | `/admin/{tenant}/*` | [`routes::admin`] | `ADMIN_TOKEN` bearer |
//! | `/webhook/ecpay/generate-test-payload[/{tenant}]` | [`routes::test_payload`] | `X-Test-Secret` |
//! | `/health/*`, `/metrics` | this module | none |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → [AdminAuth on /admin] → Handler
//! ```

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AdminAuth;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes and `/metrics` are mounted outside the request metrics
/// and tracing layers.
pub fn app(state: AppState) -> Router {
    let admin_auth = AdminAuth {
        token: state.config.admin_token.clone(),
    };

    let admin = routes::admin::router().route_layer(from_fn(auth::admin_auth_middleware));

    // Overlays are embedded from other origins.
    let public_reads = routes::progress::router().layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET]),
    );

    let api = Router::new()
        .merge(routes::ecpay::router())
        .merge(routes::checkout::router())
        .merge(routes::test_payload::router())
        .merge(public_reads)
        .merge(admin)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(admin_auth))
        .with_state(state.clone());

    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state);

    Router::new().merge(health).merge(api)
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 once the donation store answers.
async fn readiness(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => "ready".into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
        }
    }
}

/// Prometheus text exposition, when a recorder is installed.
async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
