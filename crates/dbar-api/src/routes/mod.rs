//! # Route Modules
//!
//! - `ecpay`: the gateway confirmation channels (return, redirect, webhook).
//!   These answer with the gateway acknowledgement protocol, never JSON.
//! - `checkout`: creates a signed order and hands the donor to the gateway.
//! - `progress`: goal progress snapshot and the SSE live feed.
//! - `admin`: bearer-protected goal, reset, credential and ledger routes.
//! - `test_payload`: operator-only generator of encrypted webhook payloads.

pub mod admin;
pub mod checkout;
pub mod ecpay;
pub mod progress;
pub mod test_payload;

use dbar_core::TenantId;

use crate::error::AppError;

/// Parse a `{tenant}` path segment.
pub(crate) fn tenant_param(raw: String) -> Result<TenantId, AppError> {
    TenantId::new(raw).map_err(AppError::from)
}
