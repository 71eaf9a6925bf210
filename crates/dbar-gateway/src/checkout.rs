//! # Outbound Checkout
//!
//! Builds the AIO (all-in-one) order that starts a donation: a signed
//! parameter set posted to the gateway by an auto-submitting HTML form.
//!
//! The signature covers the raw parameter values. HTML escaping is applied
//! only when rendering the form, and the browser un-escapes before posting,
//! so the gateway sees exactly the values that were signed.

use chrono::{DateTime, TimeDelta, Utc};
use dbar_core::{Amount, Credential, TenantId, TradeNo, ValidationError};
use serde::Deserialize;

/// Maximum characters the gateway accepts in one `CustomField`.
pub const CUSTOM_FIELD_MAX: usize = 50;

const PRODUCTION_CHECKOUT_URL: &str = "https://payment.ecpay.com.tw/Cashier/AioCheckOut/V5";
const STAGE_CHECKOUT_URL: &str = "https://payment-stage.ecpay.com.tw/Cashier/AioCheckOut/V5";

/// Which gateway deployment orders are sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEnvironment {
    Production,
    Stage,
}

impl GatewayEnvironment {
    pub fn checkout_url(self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_CHECKOUT_URL,
            Self::Stage => STAGE_CHECKOUT_URL,
        }
    }
}

/// Donor input for a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub amount: Amount,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A signed order ready to be posted to the gateway.
#[derive(Debug, Clone)]
pub struct CheckoutOrder {
    pub trade_no: TradeNo,
    pub amount: Amount,
    pub action: &'static str,
    /// Wire parameters in submission order, `CheckMacValue` last.
    pub params: Vec<(&'static str, String)>,
}

/// Generate a 20-character `MerchantTradeNo`: `DN`, 13-digit epoch
/// milliseconds, 5 random digits.
pub fn generate_trade_no(now: DateTime<Utc>) -> Result<TradeNo, ValidationError> {
    let millis = now.timestamp_millis().rem_euclid(10_i64.pow(13));
    let random = uuid::Uuid::new_v4().as_u128() % 100_000;
    TradeNo::new(format!("DN{millis:013}{random:05}"))
}

/// `MerchantTradeDate` in gateway format and time zone (UTC+8).
pub fn merchant_trade_date(now: DateTime<Utc>) -> String {
    (now.naive_utc() + TimeDelta::hours(8))
        .format("%Y/%m/%d %H:%M:%S")
        .to_string()
}

fn custom_field(s: Option<&str>) -> String {
    s.map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(CUSTOM_FIELD_MAX)
        .collect()
}

/// Assemble and sign an order.
pub fn build_order(
    credential: &Credential,
    tenant: &TenantId,
    request: &OrderRequest,
    trade_no: TradeNo,
    base_url: &str,
    environment: GatewayEnvironment,
    now: DateTime<Utc>,
) -> CheckoutOrder {
    let base_url = base_url.trim_end_matches('/');
    let nickname = request
        .nickname
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(dbar_core::payment::ANONYMOUS_PAYER);

    let mut params: Vec<(&'static str, String)> = vec![
        ("MerchantID", credential.merchant_id().to_string()),
        ("MerchantTradeNo", trade_no.to_string()),
        ("MerchantTradeDate", merchant_trade_date(now)),
        ("PaymentType", "aio".into()),
        ("TotalAmount", request.amount.to_string()),
        ("TradeDesc", "Stream Donation".into()),
        ("ItemName", "Stream Support x1".into()),
        ("ReturnURL", format!("{base_url}/ecpay/return")),
        ("OrderResultURL", format!("{base_url}/ecpay/result")),
        ("ClientBackURL", format!("{base_url}/donate/{tenant}")),
        ("ChoosePayment", "Credit".into()),
        ("EncryptType", "1".into()),
        ("CustomField1", custom_field(Some(nickname))),
        ("CustomField2", tenant.to_string()),
        ("CustomField3", custom_field(request.message.as_deref())),
    ];

    let mac = dbar_crypto::sign(params.iter().map(|(k, v)| (*k, v.as_str())), credential);
    params.push((dbar_crypto::CHECK_MAC_FIELD, mac));

    CheckoutOrder {
        trade_no,
        amount: request.amount,
        action: environment.checkout_url(),
        params,
    }
}

impl CheckoutOrder {
    /// Render the auto-submitting redirect page.
    pub fn to_html_form(&self) -> String {
        let inputs: String = self
            .params
            .iter()
            .map(|(k, v)| {
                format!(
                    "      <input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
                    html_escape(k),
                    html_escape(v)
                )
            })
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Redirecting to ECPay...</title>
  </head>
  <body>
    <p>Redirecting to ECPay payment gateway...</p>
    <form id="ecpayForm" method="post" action="{action}">
{inputs}    </form>
    <script>document.getElementById('ecpayForm').submit();</script>
  </body>
</html>
"#,
            action = html_escape(self.action),
        )
    }
}

/// Escape text for an HTML attribute value.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
