//! # Checkout
//!
//! `POST /create-order[/{tenant}]` takes `amount`, `nickname` and `message`
//! (form or JSON), signs an AIO order with the tenant's credential, records
//! the quoted amount and returns the auto-submitting form that carries the
//! donor to the gateway.
//!
//! Only the default tenant may fall back to the static credential. Any
//! other tenant must already have a stored credential; unknown tenants get
//! 404 and nothing is persisted for them.

use axum::extract::{Path, State};
use axum::response::Html;
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use dbar_core::TenantId;
use dbar_gateway::checkout;
use dbar_gateway::OrderRequest;
use dbar_state::PendingOrder;

use crate::error::AppError;
use crate::extractors::JsonOrForm;
use crate::routes::tenant_param;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-order", post(create_default_order))
        .route("/create-order/{tenant}", post(create_tenant_order))
}

async fn create_default_order(
    State(state): State<AppState>,
    body: Result<JsonOrForm<OrderRequest>, AppError>,
) -> Result<Html<String>, AppError> {
    let tenant = state.tenant_or_default(None);
    create_order(&state, tenant, body).await
}

async fn create_tenant_order(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    body: Result<JsonOrForm<OrderRequest>, AppError>,
) -> Result<Html<String>, AppError> {
    let tenant = tenant_param(tenant)?;
    create_order(&state, tenant, body).await
}

async fn create_order(
    state: &AppState,
    tenant: TenantId,
    body: Result<JsonOrForm<OrderRequest>, AppError>,
) -> Result<Html<String>, AppError> {
    let JsonOrForm(request) = body?;
    let credential = if tenant == state.config.default_tenant {
        state.resolver.resolve(&tenant).await?
    } else {
        state
            .resolver
            .stored(&tenant)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("unknown tenant {tenant}")))?
    };

    let now = Utc::now();
    let trade_no = checkout::generate_trade_no(now)?;
    let order = checkout::build_order(
        &credential,
        &tenant,
        &request,
        trade_no,
        &state.config.base_url,
        state.config.environment.gateway(),
        now,
    );

    state
        .store
        .record_order(&PendingOrder {
            tenant: tenant.clone(),
            trade_no: order.trade_no.clone(),
            amount: order.amount,
            created_at: now,
        })
        .await?;

    tracing::info!(
        tenant = %tenant,
        trade_no = %order.trade_no,
        amount = order.amount.get(),
        "checkout order created"
    );
    Ok(Html(order.to_html_form()))
}
