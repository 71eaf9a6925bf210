//! Per-tenant ledger shared by the in-process backends.

use std::collections::{BTreeMap, BTreeSet};

use dbar_core::{
    Amount, ApplyOutcome, Credential, DonationRecord, Goal, RunningTotal, TenantId, TradeNo,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::StorageError;
use crate::store::{PendingOrder, PENDING_ORDER_TTL_DAYS};

/// Credential as persisted. Fields may be blank in files written by older
/// versions or edited by hand.
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct StoredCredential {
    #[serde(rename = "merchantId", default)]
    pub merchant_id: String,
    #[serde(rename = "hashKey", default)]
    pub hash_key: String,
    #[serde(rename = "hashIV", default)]
    pub hash_iv: String,
}

impl StoredCredential {
    pub fn to_credential(&self) -> Option<Credential> {
        Credential::new(
            self.merchant_id.as_str(),
            self.hash_key.as_str(),
            self.hash_iv.as_str(),
        )
        .ok()
    }
}

impl From<&Credential> for StoredCredential {
    fn from(c: &Credential) -> Self {
        Self {
            merchant_id: c.merchant_id().to_string(),
            hash_key: c.hash_key().to_string(),
            hash_iv: c.hash_iv().to_string(),
        }
    }
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("merchant_id", &self.merchant_id)
            .field("hash_key", &"[REDACTED]")
            .field("hash_iv", &"[REDACTED]")
            .finish()
    }
}

/// One tenant's complete state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TenantLedger {
    #[serde(default)]
    pub goal: Goal,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub donation_count: u64,
    #[serde(default)]
    pub donations: Vec<DonationRecord>,
    #[serde(default)]
    pub seen_trade_nos: BTreeSet<TradeNo>,
    #[serde(default)]
    pub ecpay: StoredCredential,
    #[serde(default)]
    pub orders: BTreeMap<TradeNo, PendingOrder>,
}

impl TenantLedger {
    pub fn running_total(&self) -> RunningTotal {
        RunningTotal {
            total_amount: self.total,
            donation_count: self.donation_count,
        }
    }

    pub fn has(&self, trade_no: &TradeNo) -> bool {
        self.seen_trade_nos.contains(trade_no)
    }

    /// Check-then-insert. The caller holds the lock guarding `self`.
    ///
    /// Leaves `self` untouched on error. A successful apply also settles the
    /// trade's pending order.
    pub fn apply(&mut self, record: &DonationRecord) -> Result<ApplyOutcome, StorageError> {
        if self.has(&record.trade_no) {
            return Ok(ApplyOutcome::Duplicate);
        }
        let total = self
            .running_total()
            .checked_plus(record.amount)
            .ok_or_else(|| StorageError::TotalOverflow(record.tenant.clone()))?;

        self.seen_trade_nos.insert(record.trade_no.clone());
        self.donations.push(record.clone());
        self.total = total.total_amount;
        self.donation_count = total.donation_count;
        self.orders.remove(&record.trade_no);
        Ok(ApplyOutcome::Applied {
            record: record.clone(),
            total,
        })
    }

    /// Remember `order`, dropping orders quoted more than
    /// [`PENDING_ORDER_TTL_DAYS`] before it.
    pub fn record_order(&mut self, order: &PendingOrder) {
        let cutoff = order.created_at - chrono::Duration::days(PENDING_ORDER_TTL_DAYS);
        self.orders.retain(|_, o| o.created_at >= cutoff);
        self.orders.insert(order.trade_no.clone(), order.clone());
    }

    pub fn reset(&mut self) {
        self.donations.clear();
        self.seen_trade_nos.clear();
        self.total = 0;
        self.donation_count = 0;
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<DonationRecord> {
        self.donations.iter().rev().take(limit).cloned().collect()
    }

    pub fn expected_amount(&self, trade_no: &TradeNo) -> Option<Amount> {
        self.orders.get(trade_no).map(|o| o.amount)
    }

    /// Fill counters missing from files written before they were tracked.
    pub fn normalize_legacy(&mut self, tenant: &TenantId) {
        for record in &self.donations {
            self.seen_trade_nos.insert(record.trade_no.clone());
        }
        if self.donation_count == 0 {
            self.donation_count = self.seen_trade_nos.len() as u64;
        }
        for record in &mut self.donations {
            record.tenant = tenant.clone();
        }
    }
}
