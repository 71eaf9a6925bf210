//! # State Error Types

use dbar_core::{Amount, ConfigurationError, TenantId, TradeNo};
use thiserror::Error;

/// A storage backend operation failed.
///
/// Always treated as transient: the payment is not yet reconciled and the
/// gateway's own retry is expected to redeliver it.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem error in the JSON-file backend.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Relational backend error.
    #[error("database error: {0}")]
    Database(String),

    /// Persisted data violates a ledger invariant.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// The tenant's running total cannot absorb the donation. Nothing was
    /// written.
    #[error("running total overflow for tenant {0}")]
    TotalOverflow(TenantId),
}

/// Credential resolution failed.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No complete credential is available; payments are disabled for the tenant.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The persisted credential could not be read.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Applying a payment event failed; nothing was written.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The reported amount differs from the amount quoted at order creation.
    #[error("amount mismatch for {tenant}/{trade_no}: expected {expected}, reported {reported}")]
    AmountMismatch {
        tenant: TenantId,
        trade_no: TradeNo,
        expected: Amount,
        reported: Amount,
    },

    /// The ledger write failed and was rolled back.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
