//! # Donation Reconciler
//!
//! Applies an authenticated [`PaymentEvent`] to the ledger at most once.
//!
//! ```text
//! has_donation? ── yes ──▶ Duplicate
//!      │ no
//! expected amount recorded and different? ── yes ──▶ AmountMismatch
//!      │ no
//! insert_donation_atomic ──▶ Applied ─▶ notifier
//!                         └▶ Duplicate (lost a race)
//! ```
//!
//! The first check is only a fast path. Atomicity comes from the store's
//! insert, so concurrent channels reporting the same trade yield exactly one
//! `Applied`.
//!
//! Storage failures are returned, never retried here: the gateway's own
//! redelivery is the retry mechanism.

use std::sync::Arc;

use chrono::Utc;
use dbar_core::{ApplyOutcome, PaymentEvent};

use crate::error::ReconcileError;
use crate::notifier::DonationNotifier;
use crate::store::DonationStore;

/// The single write path into the donation ledger.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn DonationStore>,
    notifier: Arc<dyn DonationNotifier>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DonationStore>, notifier: Arc<dyn DonationNotifier>) -> Self {
        Self { store, notifier }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn DonationStore> {
        &self.store
    }

    /// Apply `event` to its tenant's ledger.
    pub async fn apply_payment(&self, event: &PaymentEvent) -> Result<ApplyOutcome, ReconcileError> {
        let tenant = &event.tenant;
        let trade_no = &event.trade_no;

        if self.store.has_donation(tenant, trade_no).await? {
            return Ok(self.duplicate(event));
        }

        match self.store.expected_amount(tenant, trade_no).await? {
            Some(expected) if expected != event.amount => {
                tracing::warn!(
                    tenant = %tenant,
                    trade_no = %trade_no,
                    channel = %event.channel,
                    expected = expected.get(),
                    reported = event.amount.get(),
                    "reported amount differs from quoted amount; not applied"
                );
                return Err(ReconcileError::AmountMismatch {
                    tenant: tenant.clone(),
                    trade_no: trade_no.clone(),
                    expected,
                    reported: event.amount,
                });
            }
            Some(_) => {}
            None => tracing::warn!(
                tenant = %tenant,
                trade_no = %trade_no,
                channel = %event.channel,
                "no quoted amount recorded for trade; applying reported amount"
            ),
        }

        let record = event.to_record(Utc::now());
        let outcome = self
            .store
            .insert_donation_atomic(tenant, &record)
            .await
            .map_err(|e| {
                tracing::error!(
                    tenant = %tenant,
                    trade_no = %trade_no,
                    channel = %event.channel,
                    error = %e,
                    "ledger write failed; payment not reconciled"
                );
                e
            })?;

        match &outcome {
            ApplyOutcome::Applied { record, total } => {
                metrics::counter!("dbar_donations_applied_total").increment(1);
                tracing::info!(
                    tenant = %tenant,
                    trade_no = %trade_no,
                    channel = %event.channel,
                    amount = record.amount.get(),
                    total = total.total_amount,
                    "donation applied"
                );
                self.notifier.on_donation_applied(tenant, record, *total);
                Ok(outcome)
            }
            ApplyOutcome::Duplicate => Ok(self.duplicate(event)),
        }
    }

    fn duplicate(&self, event: &PaymentEvent) -> ApplyOutcome {
        metrics::counter!("dbar_donations_duplicate_total").increment(1);
        tracing::debug!(
            tenant = %event.tenant,
            trade_no = %event.trade_no,
            channel = %event.channel,
            "trade already applied"
        );
        ApplyOutcome::Duplicate
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}
