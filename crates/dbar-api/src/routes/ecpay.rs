//! # Gateway Confirmation Routes
//!
//! | Route | Channel | Response |
//! |---|---|---|
//! | `POST /ecpay/return` | return | `1\|OK` / `0\|FAIL` |
//! | `POST /ecpay/result` | redirect | 303 to the donate page |
//! | `POST /webhook/ecpay[/{tenant}]` | webhook, periodic billing | `1\|OK` / `0\|FAIL` |
//! | `POST /webhook/{tenant}` | legacy alias of the above | same |
//!
//! An unparseable body never reaches the adapters: it is rejected with
//! `0|FAIL` like any other unauthenticated callback.

use axum::extract::rejection::FormRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::post;
use axum::{Form, Router};
use dbar_core::TenantId;
use dbar_gateway::{Ack, CallbackParams, WebhookEnvelope};

use crate::error::AppError;
use crate::extractors::JsonOrForm;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ecpay/return", post(on_return))
        .route("/ecpay/result", post(on_result))
        .route("/webhook/ecpay", post(on_webhook))
        .route("/webhook/ecpay/{tenant}", post(on_tenant_webhook))
        .route("/webhook/{tenant}", post(on_tenant_webhook))
}

/// Render an acknowledgement as the exact body the gateway expects.
pub fn ack_response(ack: Ack) -> Response {
    let status =
        StatusCode::from_u16(ack.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, ack.body()).into_response()
}

async fn on_return(
    State(state): State<AppState>,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Response {
    let Ok(Form(params)) = form else {
        tracing::warn!(channel = "return", "callback body is not a form; rejected");
        return ack_response(Ack::Reject);
    };
    ack_response(state.confirmations.on_return(&params).await.ack())
}

/// The donor's browser lands here after paying. Whatever happened, it is
/// sent on to the donate page; only the `success` flag differs.
async fn on_result(
    State(state): State<AppState>,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Redirect {
    let (tenant, paid) = match form {
        Ok(Form(params)) => {
            let confirmation = state.confirmations.on_redirect(&params).await;
            let paid = confirmation.is_paid();
            (confirmation.tenant, paid)
        }
        Err(e) => {
            tracing::warn!(channel = "redirect", error = %e, "callback body is not a form; rejected");
            (state.config.default_tenant.clone(), false)
        }
    };
    Redirect::to(&format!(
        "{}/donate/{}?success={}",
        state.config.base_url,
        tenant,
        u8::from(paid)
    ))
}

async fn on_webhook(
    State(state): State<AppState>,
    body: Result<JsonOrForm<WebhookEnvelope>, AppError>,
) -> Response {
    webhook(&state, None, body).await
}

async fn on_tenant_webhook(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    body: Result<JsonOrForm<WebhookEnvelope>, AppError>,
) -> Response {
    match TenantId::new(tenant) {
        Ok(tenant) => webhook(&state, Some(tenant), body).await,
        Err(e) => {
            tracing::warn!(channel = "webhook", error = %e, "webhook for invalid tenant; rejected");
            ack_response(Ack::Reject)
        }
    }
}

async fn webhook(
    state: &AppState,
    tenant: Option<TenantId>,
    body: Result<JsonOrForm<WebhookEnvelope>, AppError>,
) -> Response {
    let envelope = match body {
        Ok(JsonOrForm(envelope)) => envelope,
        Err(e) => {
            tracing::warn!(channel = "webhook", error = %e, "webhook envelope could not be parsed; rejected");
            return ack_response(Ack::Reject);
        }
    };
    ack_response(state.confirmations.on_webhook(tenant, &envelope).await.ack())
}
