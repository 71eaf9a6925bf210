//! # Return / Redirect Callbacks
//!
//! Both the server-side `ReturnURL` POST and the browser `OrderResultURL`
//! POST carry the same flat, unencrypted, CheckMacValue-signed form. The
//! tenant is recovered from the `CustomField2` tag the checkout embedded.

use std::collections::BTreeMap;

use dbar_core::{Amount, Channel, Credential, PaymentEvent, TenantId, TradeNo};

use crate::error::ChannelError;

/// Form fields of a return/redirect callback, keyed by wire name.
pub type CallbackParams = BTreeMap<String, String>;

/// `RtnCode` value meaning the payment succeeded.
pub const RTN_SUCCESS: &str = "1";

/// Custom field that carries the tenant tag.
pub const TENANT_FIELD: &str = "CustomField2";

/// The tenant a callback belongs to: its `CustomField2` tag, else `default`.
pub fn tenant_of(params: &CallbackParams, default: &TenantId) -> Result<TenantId, ChannelError> {
    Ok(parse_tenant_tag(params.get(TENANT_FIELD).map(String::as_str))?
        .unwrap_or_else(|| default.clone()))
}

/// A blank or absent tag is no tag.
pub(crate) fn parse_tenant_tag(tag: Option<&str>) -> Result<Option<TenantId>, ChannelError> {
    match tag.map(str::trim) {
        Some(tag) if !tag.is_empty() => TenantId::new(tag)
            .map(Some)
            .map_err(ChannelError::InvalidTenant),
        _ => Ok(None),
    }
}

/// Merchant ids are public identifiers; plain equality suffices.
pub(crate) fn merchant_matches(received: &str, credential: &Credential) -> bool {
    received.trim() == credential.merchant_id()
}

/// Check the callback's MerchantID and CheckMacValue against `credential`.
pub fn authenticate(params: &CallbackParams, credential: &Credential) -> Result<(), ChannelError> {
    let received = params.get("MerchantID").map(String::as_str).unwrap_or_default();
    if !merchant_matches(received, credential) {
        return Err(ChannelError::MerchantMismatch {
            received: received.to_string(),
        });
    }
    dbar_crypto::verify_params(
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        credential,
    )?;
    Ok(())
}

/// What an authenticated callback reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackStatus {
    /// A completed, real payment.
    Paid(PaymentEvent),
    /// The gateway reports a failed or pending payment (`RtnCode` ≠ 1).
    NotPaid { rtn_code: String },
    /// A stage-environment simulated payment (`SimulatePaid=1`).
    Simulated,
}

/// Normalize an authenticated callback into a payment event.
pub fn extract(
    params: &CallbackParams,
    tenant: TenantId,
    channel: Channel,
) -> Result<CallbackStatus, ChannelError> {
    let field = |name: &str| params.get(name).map(|s| s.trim()).filter(|s| !s.is_empty());

    let rtn_code = field("RtnCode").unwrap_or_default();
    if rtn_code != RTN_SUCCESS {
        return Ok(CallbackStatus::NotPaid {
            rtn_code: rtn_code.to_string(),
        });
    }
    if field("SimulatePaid") == Some("1") {
        return Ok(CallbackStatus::Simulated);
    }

    let trade_no = field("MerchantTradeNo")
        .ok_or_else(|| ChannelError::Malformed("MerchantTradeNo missing".into()))
        .and_then(|t| TradeNo::new(t).map_err(|e| ChannelError::Malformed(e.to_string())))?;
    let amount = field("TradeAmt")
        .ok_or_else(|| ChannelError::Malformed("TradeAmt missing".into()))
        .and_then(|a| Amount::parse(a).map_err(|e| ChannelError::Malformed(e.to_string())))?;

    Ok(CallbackStatus::Paid(PaymentEvent::new(
        tenant,
        trade_no,
        amount,
        field("CustomField1"),
        field("CustomField3"),
        channel,
    )))
}
