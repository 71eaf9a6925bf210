//! # Donation Store
//!
//! The storage interface consumed by the resolver and the reconciler.
//!
//! `insert_donation_atomic` is the only write path into the ledger. Every
//! backend must make its check-then-insert atomic per `(tenant, trade_no)`
//! and must update the running total in the same atomic unit, so that two
//! channels racing on one trade can never both insert.

pub mod json_file;
pub(crate) mod ledger;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbar_core::{
    Amount, ApplyOutcome, Credential, DonationRecord, Goal, RunningTotal, TenantId, TradeNo,
};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Days a pending order is kept when no confirmation arrives. Older orders
/// are dropped whenever a new one is recorded for the tenant.
pub const PENDING_ORDER_TTL_DAYS: i64 = 7;

/// An order created through the checkout flow, remembered so the
/// confirmation can be checked against the quoted amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrder {
    pub tenant: TenantId,
    pub trade_no: TradeNo,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Persistence backend for credentials, the donation ledger, goals and
/// pending orders. Every method is scoped to a tenant.
#[async_trait]
pub trait DonationStore: Send + Sync {
    /// The persisted credential, or `None` when absent or incomplete.
    async fn find_credential(&self, tenant: &TenantId) -> Result<Option<Credential>, StorageError>;

    /// Overwrite the tenant's credential.
    async fn save_credential(
        &self,
        tenant: &TenantId,
        credential: &Credential,
    ) -> Result<(), StorageError>;

    /// Whether the trade number has already been applied for this tenant.
    async fn has_donation(&self, tenant: &TenantId, trade_no: &TradeNo)
        -> Result<bool, StorageError>;

    /// Insert the record and bump the running total atomically.
    ///
    /// Returns [`ApplyOutcome::Duplicate`] (not an error) when the trade
    /// number is already present, including when a concurrent insert won.
    async fn insert_donation_atomic(
        &self,
        tenant: &TenantId,
        record: &DonationRecord,
    ) -> Result<ApplyOutcome, StorageError>;

    /// The tenant's aggregate; zero for an unknown tenant.
    async fn get_running_total(&self, tenant: &TenantId) -> Result<RunningTotal, StorageError>;

    /// Clear the tenant's ledger and running total.
    async fn reset_ledger(&self, tenant: &TenantId) -> Result<(), StorageError>;

    /// Up to `limit` most recent records, newest first.
    async fn recent_donations(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<DonationRecord>, StorageError>;

    /// The tenant's goal, or the default goal when none was saved.
    async fn load_goal(&self, tenant: &TenantId) -> Result<Goal, StorageError>;

    async fn save_goal(&self, tenant: &TenantId, goal: &Goal) -> Result<(), StorageError>;

    /// Remember the amount quoted for an outbound order, pruning the
    /// tenant's orders older than [`PENDING_ORDER_TTL_DAYS`].
    ///
    /// Applying a donation settles (removes) its trade's pending order.
    async fn record_order(&self, order: &PendingOrder) -> Result<(), StorageError>;

    /// The amount quoted when the order was created, if it was recorded.
    async fn expected_amount(
        &self,
        tenant: &TenantId,
        trade_no: &TradeNo,
    ) -> Result<Option<Amount>, StorageError>;

    /// Cheap liveness check used by the readiness probe.
    async fn ping(&self) -> Result<(), StorageError>;
}
