//! # Webhook Test Payloads
//!
//! Builds a webhook envelope exactly as the gateway would send it, with
//! `Data` encrypted under the tenant's own credential. Operators post it
//! back to the webhook route to exercise the full decrypt-and-reconcile
//! path without a real card transaction.

use chrono::{DateTime, Utc};
use dbar_core::{Amount, Credential, TenantId, TradeNo};

use crate::checkout::{generate_trade_no, merchant_trade_date};
use crate::error::ChannelError;
use crate::webhook::{OrderInfo, WebhookData, WebhookEnvelope};

/// A generated envelope and the plaintext it carries.
#[derive(Debug, Clone)]
pub struct TestPayload {
    pub trade_no: TradeNo,
    pub envelope: WebhookEnvelope,
    pub data: WebhookData,
}

/// Build a paid, non-simulated webhook for `amount`.
pub fn build(
    credential: &Credential,
    tenant: &TenantId,
    amount: Amount,
    nickname: Option<&str>,
    message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TestPayload, ChannelError> {
    let trade_no = generate_trade_no(now).map_err(|e| ChannelError::Malformed(e.to_string()))?;

    let data = WebhookData {
        rtn_code: "1".into(),
        rtn_msg: Some("交易成功".into()),
        merchant_id: Some(credential.merchant_id().to_string()),
        order_info: OrderInfo {
            merchant_trade_no: trade_no.to_string(),
            trade_no: Some(format!("T{}", now.timestamp_millis())),
            trade_amt: amount.to_string(),
            trade_date: Some(merchant_trade_date(now)),
            payment_type: Some("Credit_CreditCard".into()),
            trade_status: Some("1".into()),
        },
        simulate_paid: Some("0".into()),
        total_success_times: None,
        custom_field1: nickname.map(str::to_string),
        custom_field2: Some(tenant.to_string()),
        custom_field3: message.map(str::to_string),
        custom_field: None,
    };

    let plaintext = serde_json::to_string(&data).map_err(|e| ChannelError::Malformed(e.to_string()))?;
    let encrypted = dbar_crypto::encrypt_str(&plaintext, credential)?;

    Ok(TestPayload {
        trade_no,
        envelope: WebhookEnvelope {
            merchant_id: credential.merchant_id().to_string(),
            rp_header: Some(serde_json::json!({ "Timestamp": now.timestamp() })),
            trans_code: Some("1".into()),
            trans_msg: Some("Success".into()),
            data: encrypted,
        },
        data,
    })
}
