//! # Identity Newtypes
//!
//! [`TenantId`] scopes every credential, ledger entry and running total.
//! [`TradeNo`] is the gateway's `MerchantTradeNo`: the sole deduplication key
//! of the ledger within a tenant.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of a tenant slug.
const TENANT_MAX_LEN: usize = 64;

/// Maximum length of a trade number.
const TRADE_NO_MAX_LEN: usize = 64;

/// Slug of the tenant (workspace) used in single-tenant deployments.
pub const DEFAULT_TENANT: &str = "default";

/// A tenant (workspace) identifier.
///
/// Lowercase slug: `[a-z0-9][a-z0-9_-]{0,63}`. Appears in URLs and in the
/// `CustomField2` tag of outbound orders, so it is deliberately restricted to
/// characters that survive both unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a validated tenant identifier.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let mut chars = s.chars();
        let valid_first = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit());
        let valid_rest =
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !valid_first || !valid_rest || s.len() > TENANT_MAX_LEN {
            return Err(ValidationError::InvalidTenantId(s));
        }
        Ok(Self(s))
    }

    /// The tenant used when no tenant is named explicitly.
    pub fn default_tenant() -> Self {
        Self(DEFAULT_TENANT.to_string())
    }

    /// Access the slug.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

/// A merchant trade number.
///
/// 1..=64 printable ASCII characters without whitespace. The gateway itself
/// caps `MerchantTradeNo` at 20 characters; the wider bound leaves room for
/// derived keys such as periodic-billing suffixes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradeNo(String);

impl TradeNo {
    /// Create a validated trade number.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.is_empty() || s.len() > TRADE_NO_MAX_LEN || !s.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(ValidationError::InvalidTradeNo(s));
        }
        Ok(Self(s))
    }

    /// Derive the ledger key for one charge of a periodic-billing series.
    ///
    /// Each period of a recurring charge reuses the original
    /// `MerchantTradeNo`; suffixing the success counter keeps every period
    /// individually idempotent.
    pub fn for_period(&self, period: u32) -> Result<Self, ValidationError> {
        Self::new(format!("{}-P{}", self.0, period))
    }

    /// Access the trade number string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TradeNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TradeNo {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TradeNo> for String {
    fn from(t: TradeNo) -> Self {
        t.0
    }
}
