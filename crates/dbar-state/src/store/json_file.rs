//! # JSON-File Store
//!
//! Single-process backend persisting every tenant to one JSON document:
//!
//! ```json
//! { "workspaces": { "default": { "goal": {...}, "total": 0, "donations": [], ... } } }
//! ```
//!
//! Files written by the single-tenant predecessor (top-level `goal`,
//! `total`, `donations`, `seenTradeNos`, `ecpay`) are loaded as the
//! default tenant and rewritten in the workspace layout on the next write.
//!
//! Every mutation runs under one async mutex: mutate in memory, write a
//! sibling temp file, `rename` it over the original. If the write fails the
//! in-memory state is restored from a snapshot taken before the mutation,
//! so memory and disk never disagree about the ledger.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dbar_core::{
    Amount, ApplyOutcome, Credential, DonationRecord, Goal, RunningTotal, TenantId, TradeNo,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::store::ledger::{StoredCredential, TenantLedger};
use crate::store::{DonationStore, PendingOrder};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    workspaces: BTreeMap<TenantId, TenantLedger>,
}

/// [`DonationStore`] backed by a JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StoreFile>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store; nothing is written until the first
    /// mutation. `default_tenant` receives the contents of a legacy
    /// single-tenant file.
    pub async fn open(
        path: impl Into<PathBuf>,
        default_tenant: &TenantId,
    ) -> Result<Self, StorageError> {
        let path = path.into();
        let file = match tokio::fs::read(&path).await {
            Ok(bytes) => parse(&bytes, default_tenant)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreFile::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            path = %path.display(),
            tenants = file.workspaces.len(),
            "JSON-file store opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(file),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<R>(&self, tenant: &TenantId, f: impl FnOnce(&TenantLedger) -> R) -> R {
        let state = self.state.lock().await;
        match state.workspaces.get(tenant) {
            Some(ledger) => f(ledger),
            None => f(&TenantLedger::default()),
        }
    }

    /// Mutate one tenant and persist, rolling back on write failure.
    async fn mutate<R>(
        &self,
        tenant: &TenantId,
        f: impl FnOnce(&mut TenantLedger) -> R,
    ) -> Result<R, StorageError> {
        let mut state = self.state.lock().await;
        self.commit(&mut state, tenant, |l| Ok(f(l))).await
    }

    /// Apply `f` to the tenant inside an already-held critical section and
    /// write the file. Nothing is written when `f` fails.
    async fn commit<R>(
        &self,
        state: &mut StoreFile,
        tenant: &TenantId,
        f: impl FnOnce(&mut TenantLedger) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let snapshot = state.workspaces.get(tenant).cloned();
        let result = match f(state.workspaces.entry(tenant.clone()).or_default()) {
            Ok(result) => result,
            Err(e) => {
                restore(state, tenant, snapshot);
                return Err(e);
            }
        };

        if let Err(e) = self.persist(state).await {
            restore(state, tenant, snapshot);
            tracing::error!(
                path = %self.path.display(),
                tenant = %tenant,
                error = %e,
                "JSON-file store write failed; mutation rolled back"
            );
            return Err(e);
        }
        Ok(result)
    }

    async fn persist(&self, file: &StoreFile) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(file)?;
        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn restore(state: &mut StoreFile, tenant: &TenantId, snapshot: Option<TenantLedger>) {
    match snapshot {
        Some(ledger) => state.workspaces.insert(tenant.clone(), ledger),
        None => state.workspaces.remove(tenant),
    };
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "db.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn parse(bytes: &[u8], default_tenant: &TenantId) -> Result<StoreFile, StorageError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(StoreFile::default());
    }

    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let serde_json::Value::Object(map) = &value else {
        return Err(StorageError::Corrupt("top-level value is not an object".into()));
    };

    let mut file = if map.contains_key("workspaces") {
        serde_json::from_value::<StoreFile>(value)?
    } else {
        tracing::info!(tenant = %default_tenant, "loading legacy single-tenant store file");
        let legacy: TenantLedger = serde_json::from_value(value)?;
        StoreFile {
            workspaces: BTreeMap::from([(default_tenant.clone(), legacy)]),
        }
    };

    for (tenant, ledger) in &mut file.workspaces {
        ledger.normalize_legacy(tenant);
    }
    Ok(file)
}

#[async_trait]
impl DonationStore for JsonFileStore {
    async fn find_credential(&self, tenant: &TenantId) -> Result<Option<Credential>, StorageError> {
        Ok(self.read(tenant, |l| l.ecpay.to_credential()).await)
    }

    async fn save_credential(
        &self,
        tenant: &TenantId,
        credential: &Credential,
    ) -> Result<(), StorageError> {
        self.mutate(tenant, |l| l.ecpay = StoredCredential::from(credential))
            .await
    }

    async fn has_donation(
        &self,
        tenant: &TenantId,
        trade_no: &TradeNo,
    ) -> Result<bool, StorageError> {
        Ok(self.read(tenant, |l| l.has(trade_no)).await)
    }

    async fn insert_donation_atomic(
        &self,
        tenant: &TenantId,
        record: &DonationRecord,
    ) -> Result<ApplyOutcome, StorageError> {
        let mut state = self.state.lock().await;
        // Duplicates are answered without rewriting the file.
        if state
            .workspaces
            .get(tenant)
            .is_some_and(|l| l.has(&record.trade_no))
        {
            return Ok(ApplyOutcome::Duplicate);
        }
        self.commit(&mut state, tenant, |l| l.apply(record)).await
    }

    async fn get_running_total(&self, tenant: &TenantId) -> Result<RunningTotal, StorageError> {
        Ok(self.read(tenant, TenantLedger::running_total).await)
    }

    async fn reset_ledger(&self, tenant: &TenantId) -> Result<(), StorageError> {
        self.mutate(tenant, TenantLedger::reset).await
    }

    async fn recent_donations(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<DonationRecord>, StorageError> {
        Ok(self.read(tenant, |l| l.recent(limit)).await)
    }

    async fn load_goal(&self, tenant: &TenantId) -> Result<Goal, StorageError> {
        Ok(self.read(tenant, |l| l.goal.clone()).await)
    }

    async fn save_goal(&self, tenant: &TenantId, goal: &Goal) -> Result<(), StorageError> {
        self.mutate(tenant, |l| l.goal = goal.clone()).await
    }

    async fn record_order(&self, order: &PendingOrder) -> Result<(), StorageError> {
        self.mutate(&order.tenant, |l| l.record_order(order)).await
    }

    async fn expected_amount(
        &self,
        tenant: &TenantId,
        trade_no: &TradeNo,
    ) -> Result<Option<Amount>, StorageError> {
        Ok(self.read(tenant, |l| l.expected_amount(trade_no)).await)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let _state = self.state.lock().await;
        Ok(())
    }
}
