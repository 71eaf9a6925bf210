//! # Webhook Test Payloads
//!
//! `POST /webhook/ecpay/generate-test-payload[/{tenant}]` builds a webhook
//! envelope encrypted under the tenant's own credential, plus a ready-made
//! `curl` line that posts it back to this service.
//!
//! The route exists only when `WEBHOOK_TEST_SECRET` is configured, and the
//! caller must present that secret in `X-Test-Secret`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use dbar_core::{Amount, TenantId};
use dbar_gateway::{test_payload, ChannelError, WebhookData, WebhookEnvelope};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::routes::tenant_param;
use crate::state::AppState;

const DEFAULT_TEST_AMOUNT: i64 = 100;
const DEFAULT_TEST_NICKNAME: &str = "TestUser";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/ecpay/generate-test-payload", post(generate_default))
        .route("/webhook/ecpay/generate-test-payload/{tenant}", post(generate_for_tenant))
}

#[derive(Debug, Default, Deserialize)]
struct TestPayloadRequest {
    #[serde(default)]
    amount: Option<Amount>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPayloadResponse {
    pub success: bool,
    pub message: String,
    pub trade_no: String,
    pub payload: WebhookEnvelope,
    pub decrypted_data_preview: WebhookData,
    pub curl_command: String,
}

async fn generate_default(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TestPayloadRequest>, JsonRejection>,
) -> Result<Json<TestPayloadResponse>, AppError> {
    let tenant = state.tenant_or_default(None);
    generate(&state, tenant, &headers, body).await
}

async fn generate_for_tenant(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    body: Result<Json<TestPayloadRequest>, JsonRejection>,
) -> Result<Json<TestPayloadResponse>, AppError> {
    let tenant = tenant_param(tenant)?;
    generate(&state, tenant, &headers, body).await
}

async fn generate(
    state: &AppState,
    tenant: TenantId,
    headers: &HeaderMap,
    body: Result<Json<TestPayloadRequest>, JsonRejection>,
) -> Result<Json<TestPayloadResponse>, AppError> {
    let Some(secret) = state.config.webhook_test_secret.as_deref() else {
        return Err(AppError::NotFound("test payload generator is disabled".into()));
    };
    if !auth::test_secret_matches(headers, secret) {
        tracing::warn!(tenant = %tenant, "test payload request with invalid X-Test-Secret");
        return Err(AppError::Unauthorized("invalid X-Test-Secret".into()));
    }

    let request = extract_json(body)?;
    let amount = match request.amount {
        Some(amount) => amount,
        None => Amount::new(DEFAULT_TEST_AMOUNT)?,
    };
    let credential = state.resolver.resolve(&tenant).await?;

    let payload = test_payload::build(
        &credential,
        &tenant,
        amount,
        Some(request.nickname.as_deref().unwrap_or(DEFAULT_TEST_NICKNAME)),
        request.message.as_deref(),
        Utc::now(),
    )
    .map_err(|e| match e {
        ChannelError::Configuration(c) => AppError::ServiceUnavailable(c.to_string()),
        other => AppError::Internal(other.to_string()),
    })?;

    let body = serde_json::to_string(&payload.envelope)
        .map_err(|e| AppError::Internal(format!("envelope serialization failed: {e}")))?;
    let curl_command = curl_command(
        &format!("{}/webhook/ecpay/{}", state.config.base_url, tenant),
        &body,
    );

    tracing::info!(
        tenant = %tenant,
        trade_no = %payload.trade_no,
        amount = amount.get(),
        "webhook test payload generated"
    );

    Ok(Json(TestPayloadResponse {
        success: true,
        message: "Test payload generated; POST it to the webhook route to simulate a payment"
            .into(),
        trade_no: payload.trade_no.to_string(),
        payload: payload.envelope,
        decrypted_data_preview: payload.data,
        curl_command,
    }))
}

fn curl_command(url: &str, body: &str) -> String {
    format!(
        "curl -X POST {} -H 'Content-Type: application/json' -d {}",
        shell_quote(url),
        shell_quote(body)
    )
}

/// POSIX single-quoting: `'` closes the quote, emits an escaped quote and
/// reopens it.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_survive_single_quoting() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("O'Brien"), r"'O'\''Brien'");
    }

    #[test]
    fn curl_command_quotes_url_and_body() {
        let cmd = curl_command(
            "https://bar.example/webhook/ecpay/shop",
            r#"{"MerchantID":"it's"}"#,
        );
        assert_eq!(
            cmd,
            r#"curl -X POST 'https://bar.example/webhook/ecpay/shop' -H 'Content-Type: application/json' -d '{"MerchantID":"it'\''s"}'"#
        );
    }
}
