//! Postgres donation store.
//!
//! `insert_donation_atomic` runs one transaction:
//!
//! ```text
//! INSERT donation ON CONFLICT DO NOTHING RETURNING id
//!   ├─ no row  → ROLLBACK → Duplicate
//!   └─ row     → UPSERT running_totals (+amount, +1)
//!                → DELETE pending order → COMMIT → Applied
//! ```
//!
//! A unique violation (SQLSTATE 23505) that slips past `ON CONFLICT` under
//! concurrent inserts is also answered as `Duplicate`. A running total that
//! would leave `BIGINT` range (SQLSTATE 22003) rolls the transaction back
//! and is reported as [`StorageError::TotalOverflow`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbar_core::{
    Amount, ApplyOutcome, Channel, Credential, DonationRecord, Goal, RunningTotal, TenantId,
    TradeNo,
};
use dbar_state::{DonationStore, PendingOrder, StorageError, PENDING_ORDER_TTL_DAYS};
use sqlx::PgPool;

const UNIQUE_VIOLATION: &str = "23505";
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// [`DonationStore`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgDonationStore {
    pool: PgPool,
}

impl PgDonationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn has_sqlstate(e: &sqlx::Error, code: &str) -> bool {
    matches!(e, sqlx::Error::Database(d) if d.code().as_deref() == Some(code))
}

fn channel_from_db(s: &str) -> Channel {
    match s {
        "return" => Channel::Return,
        "redirect" => Channel::Redirect,
        "periodic_billing" => Channel::PeriodicBilling,
        _ => Channel::Webhook,
    }
}

fn to_total(total_amount: i64, donation_count: i64) -> RunningTotal {
    RunningTotal {
        total_amount,
        donation_count: u64::try_from(donation_count).unwrap_or(0),
    }
}

#[derive(sqlx::FromRow)]
struct DonationRow {
    trade_no: String,
    amount: i64,
    payer: String,
    message: String,
    channel: String,
    applied_at: DateTime<Utc>,
}

impl DonationRow {
    fn into_record(self, tenant: &TenantId) -> Result<DonationRecord, StorageError> {
        let corrupt = |e: dbar_core::ValidationError| StorageError::Corrupt(e.to_string());
        Ok(DonationRecord {
            tenant: tenant.clone(),
            trade_no: TradeNo::new(self.trade_no).map_err(corrupt)?,
            amount: Amount::new(self.amount).map_err(corrupt)?,
            payer: self.payer,
            message: self.message,
            applied_at: self.applied_at,
            channel: channel_from_db(&self.channel),
        })
    }
}

#[async_trait]
impl DonationStore for PgDonationStore {
    async fn find_credential(&self, tenant: &TenantId) -> Result<Option<Credential>, StorageError> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT merchant_id, hash_key, hash_iv FROM payment_credentials WHERE tenant_id = $1",
        )
        .bind(tenant.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        // An incomplete row counts as no credential.
        Ok(row.and_then(|(m, k, v)| Credential::new(m, k, v).ok()))
    }

    async fn save_credential(
        &self,
        tenant: &TenantId,
        credential: &Credential,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO payment_credentials (tenant_id, merchant_id, hash_key, hash_iv, updated_at)
             VALUES ($1, $2, $3, $4, NOW())
             ON CONFLICT (tenant_id) DO UPDATE
             SET merchant_id = EXCLUDED.merchant_id,
                 hash_key = EXCLUDED.hash_key,
                 hash_iv = EXCLUDED.hash_iv,
                 updated_at = NOW()",
        )
        .bind(tenant.as_str())
        .bind(credential.merchant_id())
        .bind(credential.hash_key())
        .bind(credential.hash_iv())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn has_donation(
        &self,
        tenant: &TenantId,
        trade_no: &TradeNo,
    ) -> Result<bool, StorageError> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM donations WHERE tenant_id = $1 AND trade_no = $2)",
        )
        .bind(tenant.as_str())
        .bind(trade_no.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn insert_donation_atomic(
        &self,
        tenant: &TenantId,
        record: &DonationRecord,
    ) -> Result<ApplyOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let inserted: Option<i64> = match sqlx::query_scalar(
            "INSERT INTO donations (tenant_id, trade_no, amount, payer, message, channel, applied_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (tenant_id, trade_no) DO NOTHING
             RETURNING id",
        )
        .bind(tenant.as_str())
        .bind(record.trade_no.as_str())
        .bind(record.amount.get())
        .bind(&record.payer)
        .bind(&record.message)
        .bind(record.channel.as_str())
        .bind(record.applied_at)
        .fetch_optional(&mut *tx)
        .await
        {
            Ok(row) => row,
            Err(e) if has_sqlstate(&e, UNIQUE_VIOLATION) => return Ok(ApplyOutcome::Duplicate),
            Err(e) => return Err(db_err(e)),
        };

        if inserted.is_none() {
            tx.rollback().await.map_err(db_err)?;
            return Ok(ApplyOutcome::Duplicate);
        }

        let (total_amount, donation_count): (i64, i64) = sqlx::query_as(
            "INSERT INTO running_totals (tenant_id, total_amount, donation_count)
             VALUES ($1, $2, 1)
             ON CONFLICT (tenant_id) DO UPDATE
             SET total_amount = running_totals.total_amount + EXCLUDED.total_amount,
                 donation_count = running_totals.donation_count + 1
             RETURNING total_amount, donation_count",
        )
        .bind(tenant.as_str())
        .bind(record.amount.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if has_sqlstate(&e, NUMERIC_OUT_OF_RANGE) {
                StorageError::TotalOverflow(tenant.clone())
            } else {
                db_err(e)
            }
        })?;

        sqlx::query("DELETE FROM pending_orders WHERE tenant_id = $1 AND trade_no = $2")
            .bind(tenant.as_str())
            .bind(record.trade_no.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(ApplyOutcome::Applied {
            record: record.clone(),
            total: to_total(total_amount, donation_count),
        })
    }

    async fn get_running_total(&self, tenant: &TenantId) -> Result<RunningTotal, StorageError> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT total_amount, donation_count FROM running_totals WHERE tenant_id = $1",
        )
        .bind(tenant.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map_or_else(RunningTotal::default, |(t, c)| to_total(t, c)))
    }

    async fn reset_ledger(&self, tenant: &TenantId) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM donations WHERE tenant_id = $1")
            .bind(tenant.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM running_totals WHERE tenant_id = $1")
            .bind(tenant.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }

    async fn recent_donations(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<DonationRecord>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<DonationRow> = sqlx::query_as(
            "SELECT trade_no, amount, payer, message, channel, applied_at
             FROM donations
             WHERE tenant_id = $1
             ORDER BY applied_at DESC, id DESC
             LIMIT $2",
        )
        .bind(tenant.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(|r| r.into_record(tenant)).collect()
    }

    async fn load_goal(&self, tenant: &TenantId) -> Result<Goal, StorageError> {
        let row: Option<(String, i64, i64)> =
            sqlx::query_as("SELECT title, amount, start_from FROM goals WHERE tenant_id = $1")
                .bind(tenant.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map_or_else(Goal::default, |(title, amount, start_from)| Goal {
            title,
            amount,
            start_from,
        }))
    }

    async fn save_goal(&self, tenant: &TenantId, goal: &Goal) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO goals (tenant_id, title, amount, start_from)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (tenant_id) DO UPDATE
             SET title = EXCLUDED.title,
                 amount = EXCLUDED.amount,
                 start_from = EXCLUDED.start_from",
        )
        .bind(tenant.as_str())
        .bind(&goal.title)
        .bind(goal.amount)
        .bind(goal.start_from)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn record_order(&self, order: &PendingOrder) -> Result<(), StorageError> {
        let cutoff = order.created_at - chrono::Duration::days(PENDING_ORDER_TTL_DAYS);
        sqlx::query("DELETE FROM pending_orders WHERE tenant_id = $1 AND created_at < $2")
            .bind(order.tenant.as_str())
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO pending_orders (tenant_id, trade_no, amount, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (tenant_id, trade_no) DO NOTHING",
        )
        .bind(order.tenant.as_str())
        .bind(order.trade_no.as_str())
        .bind(order.amount.get())
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn expected_amount(
        &self,
        tenant: &TenantId,
        trade_no: &TradeNo,
    ) -> Result<Option<Amount>, StorageError> {
        let amount: Option<i64> = sqlx::query_scalar(
            "SELECT amount FROM pending_orders WHERE tenant_id = $1 AND trade_no = $2",
        )
        .bind(tenant.as_str())
        .bind(trade_no.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        amount
            .map(Amount::new)
            .transpose()
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
