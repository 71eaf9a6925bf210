//! # Confirmation Service
//!
//! One entry point per confirmation channel. Each resolves the tenant and
//! its credential, authenticates the callback, normalizes it into a
//! [`PaymentEvent`] and hands that to the [`Reconciler`].
//!
//! Every entry point completes within the configured deadline. The ledger
//! write runs on its own task, so a deadline that fires mid-write does not
//! cancel it: the gateway is told to redeliver, and the redelivery is
//! answered idempotently whether or not the write landed.

use std::time::Duration;

use dbar_core::{ApplyOutcome, Channel, DonationRecord, PaymentEvent, RunningTotal, TenantId};
use dbar_state::{CredentialResolver, Reconciler};

use crate::ack::Ack;
use crate::callback::{self, CallbackParams, CallbackStatus};
use crate::error::ChannelError;
use crate::webhook::{self, WebhookEnvelope, WebhookStatus};

/// Why an authenticated callback was acknowledged without applying anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NotPaid { rtn_code: String },
    Simulated,
    TransportFailure { trans_code: String },
    Unsettled { trade_status: String },
    /// The decrypted MerchantID differs from the envelope's.
    InnerMerchantMismatch { received: String },
}

impl IgnoreReason {
    fn label(&self) -> &'static str {
        match self {
            Self::NotPaid { .. } => "not_paid",
            Self::Simulated => "simulated",
            Self::TransportFailure { .. } => "transport_failure",
            Self::Unsettled { .. } => "unsettled",
            Self::InnerMerchantMismatch { .. } => "inner_merchant_mismatch",
        }
    }
}

/// What a successfully processed callback did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Applied {
        record: DonationRecord,
        total: RunningTotal,
    },
    Duplicate,
    Ignored(IgnoreReason),
}

impl From<ApplyOutcome> for ChannelOutcome {
    fn from(o: ApplyOutcome) -> Self {
        match o {
            ApplyOutcome::Applied { record, total } => Self::Applied { record, total },
            ApplyOutcome::Duplicate => Self::Duplicate,
        }
    }
}

/// The result of one callback, with the tenant it was attributed to.
#[derive(Debug)]
pub struct Confirmation {
    pub tenant: TenantId,
    pub channel: Channel,
    pub result: Result<ChannelOutcome, ChannelError>,
}

impl Confirmation {
    /// Acknowledgement owed to the gateway.
    pub fn ack(&self) -> Ack {
        match &self.result {
            Ok(_) => Ack::Ok,
            Err(e) => e.ack(self.channel),
        }
    }

    /// Whether the trade is now (or was already) in the ledger.
    pub fn is_paid(&self) -> bool {
        matches!(
            self.result,
            Ok(ChannelOutcome::Applied { .. } | ChannelOutcome::Duplicate)
        )
    }

    fn label(&self) -> &'static str {
        match &self.result {
            Ok(ChannelOutcome::Applied { .. }) => "applied",
            Ok(ChannelOutcome::Duplicate) => "duplicate",
            Ok(ChannelOutcome::Ignored(reason)) => reason.label(),
            Err(e) => e.label(),
        }
    }
}

/// What the webhook revealed before it finished, for logging.
struct WebhookTrace {
    tenant: TenantId,
    channel: Channel,
    trade_no: Option<String>,
}

/// Runs the three confirmation channels against one reconciler.
#[derive(Debug, Clone)]
pub struct ConfirmationService {
    resolver: CredentialResolver,
    reconciler: Reconciler,
    default_tenant: TenantId,
    deadline: Duration,
}

impl ConfirmationService {
    pub fn new(
        resolver: CredentialResolver,
        reconciler: Reconciler,
        default_tenant: TenantId,
        deadline: Duration,
    ) -> Self {
        Self {
            resolver,
            reconciler,
            default_tenant,
            deadline,
        }
    }

    pub fn default_tenant(&self) -> &TenantId {
        &self.default_tenant
    }

    /// Synchronous `ReturnURL` callback.
    pub async fn on_return(&self, params: &CallbackParams) -> Confirmation {
        self.on_signed_form(params, Channel::Return).await
    }

    /// Browser `OrderResultURL` POST.
    pub async fn on_redirect(&self, params: &CallbackParams) -> Confirmation {
        self.on_signed_form(params, Channel::Redirect).await
    }

    async fn on_signed_form(&self, params: &CallbackParams, channel: Channel) -> Confirmation {
        let trade_hint = params.get("MerchantTradeNo").cloned();
        let tenant = match callback::tenant_of(params, &self.default_tenant) {
            Ok(t) => t,
            Err(e) => return self.finish(self.default_tenant.clone(), channel, trade_hint, Err(e)),
        };

        let result = self
            .within_deadline(self.process_signed_form(&tenant, params, channel))
            .await;
        self.finish(tenant, channel, trade_hint, result)
    }

    async fn process_signed_form(
        &self,
        tenant: &TenantId,
        params: &CallbackParams,
        channel: Channel,
    ) -> Result<ChannelOutcome, ChannelError> {
        let credential = self.resolver.resolve(tenant).await?;
        callback::authenticate(params, &credential)?;
        match callback::extract(params, tenant.clone(), channel)? {
            CallbackStatus::Paid(event) => self.reconcile(event).await,
            CallbackStatus::NotPaid { rtn_code } => {
                Ok(ChannelOutcome::Ignored(IgnoreReason::NotPaid { rtn_code }))
            }
            CallbackStatus::Simulated => Ok(ChannelOutcome::Ignored(IgnoreReason::Simulated)),
        }
    }

    /// Asynchronous webhook or periodic-billing notification.
    ///
    /// `route` is the tenant named in the URL. The decrypted `CustomField2`
    /// tag decides the tenant when the route names none; a tag that
    /// contradicts an explicit route is rejected.
    pub async fn on_webhook(
        &self,
        route: Option<TenantId>,
        envelope: &WebhookEnvelope,
    ) -> Confirmation {
        let mut seen = WebhookTrace {
            tenant: route.clone().unwrap_or_else(|| self.default_tenant.clone()),
            channel: Channel::Webhook,
            trade_no: None,
        };

        let result = self
            .within_deadline(self.process_webhook(route.as_ref(), envelope, &mut seen))
            .await;
        self.finish(seen.tenant, seen.channel, seen.trade_no, result)
    }

    async fn process_webhook(
        &self,
        route: Option<&TenantId>,
        envelope: &WebhookEnvelope,
        seen: &mut WebhookTrace,
    ) -> Result<ChannelOutcome, ChannelError> {
        let mut credential = self.resolver.resolve(&seen.tenant).await?;
        webhook::authenticate(envelope, &credential)?;
        let mut data = webhook::open(envelope, &credential)?;

        seen.trade_no = Some(data.order_info.merchant_trade_no.clone());
        if data.total_success_times.is_some() {
            seen.channel = Channel::PeriodicBilling;
        }

        if let Some(tagged) = webhook::tenant_tag(&data)? {
            if tagged != seen.tenant {
                if let Some(route) = route {
                    return Err(ChannelError::TenantMismatch {
                        route: route.clone(),
                        tagged,
                    });
                }
                // Default route: authenticate again as the tagged tenant.
                credential = self.resolver.resolve(&tagged).await?;
                webhook::authenticate(envelope, &credential)?;
                data = webhook::open(envelope, &credential)?;
                if webhook::tenant_tag(&data)?.as_ref() != Some(&tagged) {
                    return Err(ChannelError::TenantMismatch {
                        route: seen.tenant.clone(),
                        tagged,
                    });
                }
                seen.tenant = tagged;
            }
        }

        if let Some(received) = webhook::inner_merchant_mismatch(&data, &credential) {
            tracing::warn!(
                tenant = %seen.tenant,
                envelope_merchant = %envelope.merchant_id,
                payload_merchant = %received,
                "decrypted MerchantID differs from envelope; not applied"
            );
            return Ok(ChannelOutcome::Ignored(IgnoreReason::InnerMerchantMismatch {
                received,
            }));
        }

        let ignored = match webhook::extract(envelope, &data, seen.tenant.clone())? {
            WebhookStatus::Paid(event) => return self.reconcile(event).await,
            WebhookStatus::TransportFailure { trans_code } => {
                IgnoreReason::TransportFailure { trans_code }
            }
            WebhookStatus::NotPaid { rtn_code } => IgnoreReason::NotPaid { rtn_code },
            WebhookStatus::Simulated => IgnoreReason::Simulated,
            WebhookStatus::Unsettled { trade_status } => IgnoreReason::Unsettled { trade_status },
        };
        Ok(ChannelOutcome::Ignored(ignored))
    }

    async fn within_deadline(
        &self,
        work: impl std::future::Future<Output = Result<ChannelOutcome, ChannelError>>,
    ) -> Result<ChannelOutcome, ChannelError> {
        tokio::time::timeout(self.deadline, work)
            .await
            .unwrap_or(Err(ChannelError::DeadlineExceeded))
    }

    /// Apply on a detached task so a deadline cannot cancel a write in flight.
    async fn reconcile(&self, event: PaymentEvent) -> Result<ChannelOutcome, ChannelError> {
        let reconciler = self.reconciler.clone();
        let task = tokio::spawn(async move { reconciler.apply_payment(&event).await });
        match task.await {
            Ok(result) => Ok(result?.into()),
            Err(e) => Err(ChannelError::Aborted(e.to_string())),
        }
    }

    fn finish(
        &self,
        tenant: TenantId,
        channel: Channel,
        trade_no: Option<String>,
        result: Result<ChannelOutcome, ChannelError>,
    ) -> Confirmation {
        let confirmation = Confirmation {
            tenant,
            channel,
            result,
        };
        let outcome = confirmation.label();
        metrics::counter!(
            "dbar_callbacks_total",
            "channel" => channel.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        let tenant = &confirmation.tenant;
        let trade_no = trade_no.as_deref().unwrap_or("-");
        match &confirmation.result {
            Ok(ChannelOutcome::Ignored(reason)) => tracing::info!(
                tenant = %tenant,
                trade_no,
                channel = %channel,
                ?reason,
                "callback acknowledged without applying"
            ),
            Ok(_) => tracing::debug!(tenant = %tenant, trade_no, channel = %channel, outcome, "callback processed"),
            Err(ChannelError::Decryption(e)) => tracing::error!(
                tenant = %tenant,
                channel = %channel,
                stage = %e.stage,
                detail = %e.detail,
                "webhook payload could not be decrypted; check the tenant's HashKey/HashIV"
            ),
            Err(e) if e.is_transient() => tracing::error!(
                tenant = %tenant,
                trade_no,
                channel = %channel,
                error = %e,
                "callback not reconciled; gateway redelivery expected"
            ),
            Err(e) => tracing::warn!(
                tenant = %tenant,
                trade_no,
                channel = %channel,
                error = %e,
                "callback rejected"
            ),
        }
        confirmation
    }
}
