//! # Webhook / Periodic-Billing Callback
//!
//! The asynchronous server-to-server notification arrives as a small
//! envelope whose `Data` field is the AES-encrypted payload:
//!
//! ```json
//! { "MerchantID": "3002607", "RpHeader": {"Timestamp": 1700000000},
//!   "TransCode": 1, "TransMsg": "Success", "Data": "<base64>" }
//! ```
//!
//! Gate order: merchant id, decryption, tenant tag, inner merchant id,
//! `TransCode`, `RtnCode`, `SimulatePaid`, `TradeStatus`. Only a payload
//! that passes every gate becomes a [`PaymentEvent`].
//!
//! A decrypted payload carrying `TotalSuccessTimes` is one charge of a
//! periodic-billing series. Every period reuses the original
//! `MerchantTradeNo`, so it is reconciled under `<MerchantTradeNo>-P<n>`.

use dbar_core::{Amount, Channel, Credential, PaymentEvent, TenantId, TradeNo};
use serde::{Deserialize, Serialize};

use crate::callback::{merchant_matches, parse_tenant_tag};
use crate::error::ChannelError;
use crate::wire::{flex_string, flex_string_opt};

/// The outer, unencrypted webhook envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "MerchantID", deserialize_with = "flex_string")]
    pub merchant_id: String,
    #[serde(rename = "RpHeader", default, skip_serializing_if = "Option::is_none")]
    pub rp_header: Option<serde_json::Value>,
    #[serde(rename = "TransCode", default, deserialize_with = "flex_string_opt")]
    pub trans_code: Option<String>,
    #[serde(rename = "TransMsg", default)]
    pub trans_msg: Option<String>,
    #[serde(rename = "Data")]
    pub data: String,
}

/// Order details inside the decrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    #[serde(rename = "MerchantTradeNo")]
    pub merchant_trade_no: String,
    #[serde(rename = "TradeNo", default, skip_serializing_if = "Option::is_none")]
    pub trade_no: Option<String>,
    #[serde(rename = "TradeAmt", deserialize_with = "flex_string")]
    pub trade_amt: String,
    #[serde(rename = "TradeDate", default, skip_serializing_if = "Option::is_none")]
    pub trade_date: Option<String>,
    #[serde(rename = "PaymentType", default, skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<String>,
    #[serde(
        rename = "TradeStatus",
        default,
        deserialize_with = "flex_string_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub trade_status: Option<String>,
}

/// The decrypted `Data` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookData {
    #[serde(rename = "RtnCode", deserialize_with = "flex_string")]
    pub rtn_code: String,
    #[serde(rename = "RtnMsg", default, skip_serializing_if = "Option::is_none")]
    pub rtn_msg: Option<String>,
    #[serde(rename = "MerchantID", default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    #[serde(rename = "OrderInfo")]
    pub order_info: OrderInfo,
    #[serde(
        rename = "SimulatePaid",
        default,
        deserialize_with = "flex_string_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub simulate_paid: Option<String>,
    #[serde(
        rename = "TotalSuccessTimes",
        default,
        deserialize_with = "flex_string_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_success_times: Option<String>,
    /// Payer display name.
    #[serde(rename = "CustomField1", default, skip_serializing_if = "Option::is_none")]
    pub custom_field1: Option<String>,
    /// Tenant tag.
    #[serde(rename = "CustomField2", default, skip_serializing_if = "Option::is_none")]
    pub custom_field2: Option<String>,
    /// Donor note.
    #[serde(rename = "CustomField3", default, skip_serializing_if = "Option::is_none")]
    pub custom_field3: Option<String>,
    /// Single custom field used by some payment products; payer fallback.
    #[serde(rename = "CustomField", default, skip_serializing_if = "Option::is_none")]
    pub custom_field: Option<String>,
}

/// Result of passing a decrypted payload through the status gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookStatus {
    Paid(PaymentEvent),
    /// `TransCode` ≠ 1: the envelope itself reports a gateway-side failure.
    TransportFailure { trans_code: String },
    /// `RtnCode` ≠ 1.
    NotPaid { rtn_code: String },
    Simulated,
    /// `TradeStatus` present and ≠ 1.
    Unsettled { trade_status: String },
}

/// Check the envelope's MerchantID against the tenant credential.
pub fn authenticate(envelope: &WebhookEnvelope, credential: &Credential) -> Result<(), ChannelError> {
    if merchant_matches(&envelope.merchant_id, credential) {
        Ok(())
    } else {
        Err(ChannelError::MerchantMismatch {
            received: envelope.merchant_id.clone(),
        })
    }
}

/// Decrypt the `Data` field.
pub fn open(envelope: &WebhookEnvelope, credential: &Credential) -> Result<WebhookData, ChannelError> {
    Ok(dbar_crypto::decrypt_as(&envelope.data, credential)?)
}

/// The tenant named by the decrypted `CustomField2`, if any.
pub fn tenant_tag(data: &WebhookData) -> Result<Option<TenantId>, ChannelError> {
    parse_tenant_tag(data.custom_field2.as_deref())
}

/// The decrypted MerchantID when it differs from `credential`'s.
pub fn inner_merchant_mismatch(data: &WebhookData, credential: &Credential) -> Option<String> {
    data.merchant_id
        .as_deref()
        .filter(|inner| !merchant_matches(inner, credential))
        .map(str::to_string)
}

fn is_one(v: &str) -> bool {
    v.trim() == "1"
}

/// Apply the status gates and normalize into a payment event.
pub fn extract(
    envelope: &WebhookEnvelope,
    data: &WebhookData,
    tenant: TenantId,
) -> Result<WebhookStatus, ChannelError> {
    if let Some(code) = envelope.trans_code.as_deref() {
        if !is_one(code) {
            return Ok(WebhookStatus::TransportFailure {
                trans_code: code.to_string(),
            });
        }
    }
    if !is_one(&data.rtn_code) {
        return Ok(WebhookStatus::NotPaid {
            rtn_code: data.rtn_code.clone(),
        });
    }
    if data.simulate_paid.as_deref().is_some_and(is_one) {
        return Ok(WebhookStatus::Simulated);
    }

    let order = &data.order_info;
    let period = data
        .total_success_times
        .as_deref()
        .map(|n| {
            n.trim()
                .parse::<u32>()
                .map_err(|_| ChannelError::Malformed(format!("TotalSuccessTimes {n:?}")))
        })
        .transpose()?;

    if period.is_none() {
        if let Some(status) = order.trade_status.as_deref() {
            if !is_one(status) {
                return Ok(WebhookStatus::Unsettled {
                    trade_status: status.to_string(),
                });
            }
        }
    }

    let base = TradeNo::new(order.merchant_trade_no.trim())
        .map_err(|e| ChannelError::Malformed(e.to_string()))?;
    let (trade_no, channel) = match period {
        Some(n) => (
            base.for_period(n)
                .map_err(|e| ChannelError::Malformed(e.to_string()))?,
            Channel::PeriodicBilling,
        ),
        None => (base, Channel::Webhook),
    };
    let amount =
        Amount::parse(order.trade_amt.trim()).map_err(|e| ChannelError::Malformed(e.to_string()))?;

    let payer = data
        .custom_field1
        .as_deref()
        .or(data.custom_field.as_deref());

    Ok(WebhookStatus::Paid(PaymentEvent::new(
        tenant,
        trade_no,
        amount,
        payer,
        data.custom_field3.as_deref(),
        channel,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(data: &str) -> WebhookEnvelope {
        WebhookEnvelope {
            merchant_id: "3002607".into(),
            rp_header: None,
            trans_code: Some("1".into()),
            trans_msg: Some("Success".into()),
            data: data.into(),
        }
    }

    fn payload(v: serde_json::Value) -> WebhookData {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn envelope_accepts_numeric_and_string_codes() {
        let a: WebhookEnvelope =
            serde_json::from_value(json!({"MerchantID": "3002607", "TransCode": 1, "Data": "x"})).unwrap();
        let b: WebhookEnvelope =
            serde_json::from_value(json!({"MerchantID": 3002607, "TransCode": "1", "Data": "x"})).unwrap();
        assert_eq!(a.trans_code.as_deref(), Some("1"));
        assert_eq!(a.merchant_id, b.merchant_id);
    }

    #[test]
    fn paid_payload_becomes_event() {
        let data = payload(json!({
            "RtnCode": 1,
            "OrderInfo": {"MerchantTradeNo": "DN1", "TradeAmt": 500, "TradeStatus": "1"},
            "CustomField": "小明"
        }));
        let status = extract(&envelope(""), &data, TenantId::default_tenant()).unwrap();
        let WebhookStatus::Paid(ev) = status else {
            panic!("expected paid, got {status:?}");
        };
        assert_eq!(ev.amount.get(), 500);
        assert_eq!(ev.payer, "小明");
        assert_eq!(ev.channel, Channel::Webhook);
    }

    #[test]
    fn gates_short_circuit_in_order() {
        let base = json!({"RtnCode": 1, "OrderInfo": {"MerchantTradeNo": "DN1", "TradeAmt": 5, "TradeStatus": "1"}});

        let mut env = envelope("");
        env.trans_code = Some("0".into());
        assert!(matches!(
            extract(&env, &payload(base.clone()), TenantId::default_tenant()).unwrap(),
            WebhookStatus::TransportFailure { .. }
        ));

        let mut simulated = base.clone();
        simulated["SimulatePaid"] = json!(1);
        assert_eq!(
            extract(&envelope(""), &payload(simulated), TenantId::default_tenant()).unwrap(),
            WebhookStatus::Simulated
        );

        let mut failed = base.clone();
        failed["RtnCode"] = json!("10300066");
        assert!(matches!(
            extract(&envelope(""), &payload(failed), TenantId::default_tenant()).unwrap(),
            WebhookStatus::NotPaid { .. }
        ));

        let mut unpaid = base;
        unpaid["OrderInfo"]["TradeStatus"] = json!("0");
        assert!(matches!(
            extract(&envelope(""), &payload(unpaid), TenantId::default_tenant()).unwrap(),
            WebhookStatus::Unsettled { .. }
        ));
    }

    #[test]
    fn periodic_billing_suffixes_trade_no() {
        let data = payload(json!({
            "RtnCode": "1",
            "TotalSuccessTimes": 3,
            "OrderInfo": {"MerchantTradeNo": "SUB1", "TradeAmt": "99"}
        }));
        let WebhookStatus::Paid(ev) = extract(&envelope(""), &data, TenantId::default_tenant()).unwrap() else {
            panic!("expected paid");
        };
        assert_eq!(ev.trade_no.as_str(), "SUB1-P3");
        assert_eq!(ev.channel, Channel::PeriodicBilling);
    }

    #[test]
    fn inner_merchant_mismatch_is_reported_after_decryption() {
        let cred = Credential::new("3002607", "pwFHCqoQZGmho4w6", "EkRm7iFT261dpevs").unwrap();
        let inner = json!({"RtnCode": 1, "MerchantID": "9999999",
            "OrderInfo": {"MerchantTradeNo": "DN1", "TradeAmt": 5}});
        let blob = dbar_crypto::encrypt(&inner, &cred).unwrap();
        let data = open(&envelope(&blob), &cred).unwrap();
        assert_eq!(
            inner_merchant_mismatch(&data, &cred).as_deref(),
            Some("9999999")
        );

        let matching = payload(json!({"RtnCode": 1, "MerchantID": " 3002607 ",
            "OrderInfo": {"MerchantTradeNo": "DN1", "TradeAmt": 5}}));
        assert_eq!(inner_merchant_mismatch(&matching, &cred), None);
    }

    #[test]
    fn tenant_tag_ignores_blank_and_rejects_invalid() {
        let base = json!({"RtnCode": 1, "OrderInfo": {"MerchantTradeNo": "DN1", "TradeAmt": 5}});
        assert_eq!(tenant_tag(&payload(base.clone())).unwrap(), None);

        let mut blank = base.clone();
        blank["CustomField2"] = json!("  ");
        assert_eq!(tenant_tag(&payload(blank)).unwrap(), None);

        let mut shop = base.clone();
        shop["CustomField2"] = json!("shop");
        assert_eq!(
            tenant_tag(&payload(shop)).unwrap(),
            Some(TenantId::new("shop").unwrap())
        );

        let mut bad = base;
        bad["CustomField2"] = json!("Not A Slug");
        assert!(matches!(
            tenant_tag(&payload(bad)),
            Err(ChannelError::InvalidTenant(_))
        ));
    }
}
