//! # Donation Notifications
//!
//! Hook invoked after a donation is applied. Delivery is the implementor's
//! concern; the reconciler fires and forgets.

use dbar_core::{DonationRecord, RunningTotal, TenantId};

/// Receives every successfully applied donation.
///
/// Called synchronously on the reconciling task, after the ledger write has
/// committed. Implementations must not block.
pub trait DonationNotifier: Send + Sync {
    fn on_donation_applied(&self, tenant: &TenantId, record: &DonationRecord, total: RunningTotal);
}

/// Notifier that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl DonationNotifier for NoopNotifier {
    fn on_donation_applied(&self, _: &TenantId, _: &DonationRecord, _: RunningTotal) {}
}
