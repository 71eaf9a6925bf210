//! # Error Types
//!
//! Validation and configuration errors shared by every crate in the
//! workspace. All errors use `thiserror` for derive-based `Display` and
//! `Error` implementations.

use thiserror::Error;

/// A domain primitive failed validation at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Tenant identifier is not a lowercase slug.
    #[error("invalid tenant id {0:?}: expected 1-64 chars of [a-z0-9_-], starting with [a-z0-9]")]
    InvalidTenantId(String),

    /// Trade number is empty, too long, or contains whitespace/control characters.
    #[error("invalid trade number {0:?}: expected 1-64 printable ASCII chars without whitespace")]
    InvalidTradeNo(String),

    /// Amount is not a strictly positive integer within the payment cap.
    #[error("invalid amount {0:?}: expected a positive integer up to 100000000")]
    InvalidAmount(String),

    /// Free-text field exceeds its maximum length.
    #[error("{field} exceeds {max} characters")]
    TooLong {
        /// Name of the offending field.
        field: &'static str,
        /// Maximum permitted character count.
        max: usize,
    },
}

/// Gateway credentials could not be resolved for a tenant.
///
/// Callers must treat this as "payments disabled for this tenant" and fail
/// closed, never as a crash.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// One or more credential fields are missing or empty.
    #[error("credential incomplete: missing {missing}")]
    Incomplete {
        /// Comma-separated names of the missing fields.
        missing: String,
    },

    /// Neither persisted nor static configuration yields a complete credential.
    #[error("no complete payment credential configured for tenant {tenant}")]
    Unconfigured {
        /// The tenant whose credential could not be resolved.
        tenant: String,
    },

    /// The hash key or IV cannot serve as an AES-128 key/IV.
    #[error("{field} must be exactly 16 bytes for payload decryption, got {actual}")]
    InvalidKeyLength {
        /// Which secret was rejected (`HashKey` or `HashIV`).
        field: &'static str,
        /// Observed byte length.
        actual: usize,
    },
}
