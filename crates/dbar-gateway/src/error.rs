//! # Channel Errors
//!
//! Everything that can go wrong between receiving a callback and the ledger
//! write, and how each case is acknowledged to the gateway.

use dbar_core::{Channel, ConfigurationError, TenantId, ValidationError};
use dbar_crypto::{DecryptionError, SignatureError};
use dbar_state::{ReconcileError, ResolveError, StorageError};
use thiserror::Error;

use crate::ack::Ack;

/// A callback contributed nothing to the ledger.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The tenant has no complete credential; payments are disabled.
    #[error("tenant unconfigured: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The callback names a tenant that is not a valid slug.
    #[error("invalid tenant tag: {0}")]
    InvalidTenant(ValidationError),

    /// The decrypted tenant tag names a different tenant than the route.
    #[error("tenant tag {tagged} does not match route tenant {route}")]
    TenantMismatch { route: TenantId, tagged: TenantId },

    /// MerchantID in the callback differs from the tenant's credential.
    #[error("merchant id mismatch: callback carried {received:?}")]
    MerchantMismatch { received: String },

    /// CheckMacValue missing or wrong.
    #[error("signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    /// The webhook `Data` field could not be recovered.
    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    /// A required field is missing or invalid.
    #[error("malformed callback: {0}")]
    Malformed(String),

    /// The reported amount differs from the quoted amount.
    #[error("{0}")]
    AmountMismatch(ReconcileError),

    /// Transient storage failure; the gateway should redeliver.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The callback could not be completed before the response deadline.
    #[error("callback deadline exceeded")]
    DeadlineExceeded,

    /// The reconciliation task panicked or was cancelled.
    #[error("reconciliation aborted: {0}")]
    Aborted(String),
}

impl From<ResolveError> for ChannelError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Configuration(c) => Self::Configuration(c),
            ResolveError::Storage(s) => Self::Storage(s),
        }
    }
}

impl From<ReconcileError> for ChannelError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Storage(s) => Self::Storage(s),
            mismatch @ ReconcileError::AmountMismatch { .. } => Self::AmountMismatch(mismatch),
        }
    }
}

impl ChannelError {
    /// Transient failures that a redelivery can fix.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::DeadlineExceeded | Self::Aborted(_)
        )
    }

    /// Whether the sender failed authentication or could not be attributed
    /// to a tenant.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::MerchantMismatch { .. }
                | Self::Signature(_)
                | Self::Configuration(_)
                | Self::InvalidTenant(_)
                | Self::TenantMismatch { .. }
        )
    }

    /// The acknowledgement owed to the gateway for this failure.
    ///
    /// The webhook acknowledges every non-transient failure once its
    /// merchant check has passed, because redelivering a structurally
    /// broken or business-rejected payload cannot change the outcome.
    pub fn ack(&self, channel: Channel) -> Ack {
        if self.is_transient() {
            return Ack::Retry;
        }
        match channel {
            Channel::Webhook | Channel::PeriodicBilling if !self.is_unauthenticated() => Ack::Ok,
            _ => Ack::Reject,
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "unconfigured",
            Self::InvalidTenant(_) => "invalid_tenant",
            Self::TenantMismatch { .. } => "tenant_mismatch",
            Self::MerchantMismatch { .. } => "merchant_mismatch",
            Self::Signature(_) => "signature_mismatch",
            Self::Decryption(_) => "decryption_error",
            Self::Malformed(_) => "malformed",
            Self::AmountMismatch(_) => "amount_mismatch",
            Self::Storage(_) => "storage_error",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Aborted(_) => "aborted",
        }
    }
}
