//! # Live Ledger Feed
//!
//! One `tokio::sync::broadcast` channel per tenant. The reconciler reports
//! applied donations through [`DonationNotifier`]; admin routes publish
//! [`LedgerEvent::Changed`] after goal edits and resets. SSE subscribers
//! recompute progress on every event, so a lagging subscriber that drops
//! events still converges on the latest state.

use std::collections::HashMap;
use std::sync::Arc;

use dbar_core::{DonationRecord, RunningTotal, TenantId};
use dbar_state::DonationNotifier;
use parking_lot::RwLock;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Something changed in a tenant's ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    DonationApplied {
        record: DonationRecord,
        total: RunningTotal,
    },
    /// Goal edited or ledger reset.
    Changed,
}

/// Per-tenant fan-out of ledger events.
#[derive(Debug, Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<RwLock<HashMap<TenantId, broadcast::Sender<LedgerEvent>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `tenant`'s events, creating its channel on first use.
    pub fn subscribe(&self, tenant: &TenantId) -> broadcast::Receiver<LedgerEvent> {
        if let Some(tx) = self.channels.read().get(tenant) {
            return tx.subscribe();
        }
        self.channels
            .write()
            .entry(tenant.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send `event` to `tenant`'s subscribers; returns how many received it.
    pub fn publish(&self, tenant: &TenantId, event: LedgerEvent) -> usize {
        let delivered = match self.channels.read().get(tenant) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => return 0,
        };
        if delivered == 0 {
            // Last subscriber went away; drop the channel until someone returns.
            let mut channels = self.channels.write();
            if channels.get(tenant).is_some_and(|tx| tx.receiver_count() == 0) {
                channels.remove(tenant);
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, tenant: &TenantId) -> usize {
        self.channels
            .read()
            .get(tenant)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

impl DonationNotifier for BroadcastHub {
    fn on_donation_applied(&self, tenant: &TenantId, record: &DonationRecord, total: RunningTotal) {
        self.publish(
            tenant,
            LedgerEvent::DonationApplied {
                record: record.clone(),
                total,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dbar_core::{Amount, Channel, PaymentEvent, TradeNo};

    fn record(tenant: &TenantId) -> DonationRecord {
        PaymentEvent::new(
            tenant.clone(),
            TradeNo::new("T1").unwrap(),
            Amount::new(100).unwrap(),
            Some("小明"),
            None,
            Channel::Webhook,
        )
        .to_record(Utc::now())
    }

    #[tokio::test]
    async fn subscribers_receive_only_their_tenant() {
        let hub = BroadcastHub::new();
        let a = TenantId::new("a").unwrap();
        let b = TenantId::new("b").unwrap();
        let mut rx_a = hub.subscribe(&a);
        let mut rx_b = hub.subscribe(&b);

        let total = RunningTotal::default()
            .checked_plus(Amount::new(100).unwrap())
            .unwrap();
        hub.on_donation_applied(&a, &record(&a), total);

        match rx_a.recv().await.unwrap() {
            LedgerEvent::DonationApplied { total, .. } => assert_eq!(total.total_amount, 100),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let hub = BroadcastHub::new();
        let t = TenantId::default_tenant();
        assert_eq!(hub.publish(&t, LedgerEvent::Changed), 0);
    }

    #[test]
    fn channel_is_dropped_after_last_subscriber_leaves() {
        let hub = BroadcastHub::new();
        let t = TenantId::default_tenant();
        let rx = hub.subscribe(&t);
        assert_eq!(hub.subscriber_count(&t), 1);
        drop(rx);
        assert_eq!(hub.publish(&t, LedgerEvent::Changed), 0);
        assert_eq!(hub.subscriber_count(&t), 0);
        assert!(hub.channels.read().is_empty());
    }
}
