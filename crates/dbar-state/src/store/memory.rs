//! # In-Memory Store
//!
//! Process-local backend for tests and ephemeral sandbox runs.
//!
//! The lock is `parking_lot` and is never held across an `.await`, so the
//! async trait methods complete without suspending.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dbar_core::{
    Amount, ApplyOutcome, Credential, DonationRecord, Goal, RunningTotal, TenantId, TradeNo,
};
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::store::ledger::{StoredCredential, TenantLedger};
use crate::store::{DonationStore, PendingOrder};

/// Thread-safe, cloneable in-memory [`DonationStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tenants: Arc<RwLock<HashMap<TenantId, TenantLedger>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, tenant: &TenantId, f: impl FnOnce(&TenantLedger) -> R) -> R {
        match self.tenants.read().get(tenant) {
            Some(ledger) => f(ledger),
            None => f(&TenantLedger::default()),
        }
    }

    fn write<R>(&self, tenant: &TenantId, f: impl FnOnce(&mut TenantLedger) -> R) -> R {
        f(self.tenants.write().entry(tenant.clone()).or_default())
    }
}

#[async_trait]
impl DonationStore for MemoryStore {
    async fn find_credential(&self, tenant: &TenantId) -> Result<Option<Credential>, StorageError> {
        Ok(self.read(tenant, |l| l.ecpay.to_credential()))
    }

    async fn save_credential(
        &self,
        tenant: &TenantId,
        credential: &Credential,
    ) -> Result<(), StorageError> {
        self.write(tenant, |l| l.ecpay = StoredCredential::from(credential));
        Ok(())
    }

    async fn has_donation(
        &self,
        tenant: &TenantId,
        trade_no: &TradeNo,
    ) -> Result<bool, StorageError> {
        Ok(self.read(tenant, |l| l.has(trade_no)))
    }

    async fn insert_donation_atomic(
        &self,
        tenant: &TenantId,
        record: &DonationRecord,
    ) -> Result<ApplyOutcome, StorageError> {
        self.write(tenant, |l| l.apply(record))
    }

    async fn get_running_total(&self, tenant: &TenantId) -> Result<RunningTotal, StorageError> {
        Ok(self.read(tenant, TenantLedger::running_total))
    }

    async fn reset_ledger(&self, tenant: &TenantId) -> Result<(), StorageError> {
        self.write(tenant, TenantLedger::reset);
        Ok(())
    }

    async fn recent_donations(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<DonationRecord>, StorageError> {
        Ok(self.read(tenant, |l| l.recent(limit)))
    }

    async fn load_goal(&self, tenant: &TenantId) -> Result<Goal, StorageError> {
        Ok(self.read(tenant, |l| l.goal.clone()))
    }

    async fn save_goal(&self, tenant: &TenantId, goal: &Goal) -> Result<(), StorageError> {
        self.write(tenant, |l| l.goal = goal.clone());
        Ok(())
    }

    async fn record_order(&self, order: &PendingOrder) -> Result<(), StorageError> {
        self.write(&order.tenant, |l| l.record_order(order));
        Ok(())
    }

    async fn expected_amount(
        &self,
        tenant: &TenantId,
        trade_no: &TradeNo,
    ) -> Result<Option<Amount>, StorageError> {
        Ok(self.read(tenant, |l| l.expected_amount(trade_no)))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbar_core::Channel;

    fn record(tenant: &TenantId, trade: &str, amount: i64) -> DonationRecord {
        DonationRecord {
            tenant: tenant.clone(),
            trade_no: TradeNo::new(trade).unwrap(),
            amount: Amount::new(amount).unwrap(),
            payer: "p".into(),
            message: String::new(),
            applied_at: chrono::Utc::now(),
            channel: Channel::Webhook,
        }
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = MemoryStore::new();
        let a = TenantId::new("a").unwrap();
        let b = TenantId::new("b").unwrap();

        let out = store
            .insert_donation_atomic(&a, &record(&a, "T1", 100))
            .await
            .unwrap();
        assert!(out.is_applied());
        // Same trade number under another tenant is a distinct donation.
        let out = store
            .insert_donation_atomic(&b, &record(&b, "T1", 100))
            .await
            .unwrap();
        assert!(out.is_applied());

        assert_eq!(store.get_running_total(&a).await.unwrap().total_amount, 100);
        assert_eq!(store.get_running_total(&b).await.unwrap().total_amount, 100);
    }

    #[tokio::test]
    async fn unknown_tenant_reads_defaults() {
        let store = MemoryStore::new();
        let t = TenantId::new("ghost").unwrap();
        assert_eq!(store.get_running_total(&t).await.unwrap(), RunningTotal::default());
        assert_eq!(store.load_goal(&t).await.unwrap(), Goal::default());
        assert!(store.find_credential(&t).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let store = MemoryStore::new();
        let t = TenantId::default_tenant();
        for (i, trade) in ["A", "B", "C"].iter().enumerate() {
            store
                .insert_donation_atomic(&t, &record(&t, trade, i as i64 + 1))
                .await
                .unwrap();
        }
        let recent = store.recent_donations(&t, 2).await.unwrap();
        let trades: Vec<&str> = recent.iter().map(|r| r.trade_no.as_str()).collect();
        assert_eq!(trades, vec!["C", "B"]);
    }
}
