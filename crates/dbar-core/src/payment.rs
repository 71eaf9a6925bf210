//! # Payments and the Donation Ledger
//!
//! [`PaymentEvent`] is what a confirmation channel claims happened.
//! [`DonationRecord`] is what the ledger keeps once the claim has been
//! authenticated and applied. [`RunningTotal`] is the per-tenant aggregate
//! that must move in lockstep with the records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;
use crate::identity::{TenantId, TradeNo};

/// Display name used when the payer left the nickname blank.
pub const ANONYMOUS_PAYER: &str = "Anonymous";

/// Maximum length (in characters) of the payer display name.
pub const MAX_PAYER_LEN: usize = 50;

/// Maximum length (in characters) of the donor note.
pub const MAX_NOTE_LEN: usize = 200;

// ── Amount ──────────────────────────────────────────────────────────

/// A strictly positive whole-currency amount, at most [`Amount::MAX`].
///
/// The gateway deals in whole New Taiwan dollars; there is no minor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Largest single payment accepted.
    pub const MAX: i64 = 100_000_000;

    /// Construct from an integer, rejecting zero, negatives and anything
    /// above [`Amount::MAX`].
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if value <= 0 || value > Self::MAX {
            return Err(ValidationError::InvalidAmount(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Parse the literal decimal string a gateway callback carries.
    ///
    /// Only ASCII digits are accepted: no sign, no decimal point, no
    /// surrounding whitespace, no digit grouping.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidAmount(s.to_string()));
        }
        let value: i64 = s
            .parse()
            .map_err(|_| ValidationError::InvalidAmount(s.to_string()))?;
        Self::new(value).map_err(|_| ValidationError::InvalidAmount(s.to_string()))
    }

    /// The amount as an integer.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(i64),
            Str(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Int(n) => Amount::new(n),
            Repr::Str(s) => Amount::parse(&s),
        }
        .map_err(serde::de::Error::custom)
    }
}

// ── Channels ────────────────────────────────────────────────────────

/// The confirmation path a payment claim arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Synchronous server-side return (`ReturnURL`).
    Return,
    /// Browser redirect / result POST (`OrderResultURL`).
    Redirect,
    /// Asynchronous encrypted webhook. Also the default for records imported
    /// from ledgers that predate channel tracking.
    #[default]
    Webhook,
    /// Recurring charge reported through the webhook envelope.
    PeriodicBilling,
}

impl Channel {
    /// Stable lowercase label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Return => "return",
            Self::Redirect => "redirect",
            Self::Webhook => "webhook",
            Self::PeriodicBilling => "periodic_billing",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Events and records ──────────────────────────────────────────────

/// A normalized claim that a payment completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    /// Tenant the payment belongs to.
    pub tenant: TenantId,
    /// External unique id; the deduplication key within the tenant.
    pub trade_no: TradeNo,
    /// Amount paid.
    pub amount: Amount,
    /// Payer display name, already defaulted and truncated.
    pub payer: String,
    /// Free-text note from the donor.
    pub note: String,
    /// Channel that reported the payment.
    pub channel: Channel,
}

impl PaymentEvent {
    /// Build an event, normalizing the payer name and note.
    ///
    /// A blank payer becomes [`ANONYMOUS_PAYER`]. Both text fields are trimmed
    /// and truncated to their maximum character counts.
    pub fn new(
        tenant: TenantId,
        trade_no: TradeNo,
        amount: Amount,
        payer: Option<&str>,
        note: Option<&str>,
        channel: Channel,
    ) -> Self {
        let payer = payer.map(str::trim).filter(|p| !p.is_empty());
        Self {
            tenant,
            trade_no,
            amount,
            payer: truncate_chars(payer.unwrap_or(ANONYMOUS_PAYER), MAX_PAYER_LEN),
            note: truncate_chars(note.unwrap_or_default().trim(), MAX_NOTE_LEN),
            channel,
        }
    }

    /// Materialize the ledger entry this event produces when applied now.
    pub fn to_record(&self, applied_at: DateTime<Utc>) -> DonationRecord {
        DonationRecord {
            tenant: self.tenant.clone(),
            trade_no: self.trade_no.clone(),
            amount: self.amount,
            payer: self.payer.clone(),
            message: self.note.clone(),
            applied_at,
            channel: self.channel,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// A persisted, applied donation.
///
/// Unique per `(tenant, trade_no)`. Never mutated; removed only by a bulk
/// ledger reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    #[serde(default = "TenantId::default_tenant")]
    pub tenant: TenantId,
    pub trade_no: TradeNo,
    pub amount: Amount,
    pub payer: String,
    #[serde(default)]
    pub message: String,
    #[serde(alias = "at")]
    pub applied_at: DateTime<Utc>,
    #[serde(default)]
    pub channel: Channel,
}

/// Per-tenant aggregate over the ledger.
///
/// `total_amount` always equals the sum of the tenant's record amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningTotal {
    pub total_amount: i64,
    pub donation_count: u64,
}

impl RunningTotal {
    /// The aggregate after one more donation of `amount`, or `None` when
    /// either counter would overflow.
    pub fn checked_plus(self, amount: Amount) -> Option<Self> {
        Some(Self {
            total_amount: self.total_amount.checked_add(amount.get())?,
            donation_count: self.donation_count.checked_add(1)?,
        })
    }
}

/// Result of applying a payment event to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event created a new record; carries the record and the new total.
    Applied {
        record: DonationRecord,
        total: RunningTotal,
    },
    /// A record for this trade number already existed; nothing changed.
    Duplicate,
}

impl ApplyOutcome {
    /// `true` when the event created a new ledger entry.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn amount_parse_accepts_plain_digits() {
        assert_eq!(Amount::parse("500").unwrap().get(), 500);
        assert_eq!(Amount::parse("1").unwrap().get(), 1);
    }

    #[test]
    fn amount_parse_rejects_non_positive_and_decorated() {
        for bad in ["", "0", "000", "-5", "+5", "5.0", " 5", "1,000", "NaN", "100000001", "99999999999999999999"] {
            assert!(Amount::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn amount_deserializes_from_number_or_string() {
        let a: Amount = serde_json::from_str("500").unwrap();
        let b: Amount = serde_json::from_str("\"500\"").unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<Amount>("0").is_err());
        assert!(serde_json::from_str::<Amount>("\"-1\"").is_err());
    }

    #[test]
    fn event_defaults_anonymous_and_truncates() {
        let event = PaymentEvent::new(
            TenantId::default_tenant(),
            TradeNo::new("T1").unwrap(),
            Amount::new(100).unwrap(),
            Some("   "),
            Some(&"字".repeat(300)),
            Channel::Return,
        );
        assert_eq!(event.payer, ANONYMOUS_PAYER);
        assert_eq!(event.note.chars().count(), MAX_NOTE_LEN);
    }

    #[test]
    fn legacy_record_loads_with_defaults() {
        let json = r#"{"tradeNo":"T9","amount":300,"payer":"小明","message":"","at":"2024-01-02T03:04:05.000Z"}"#;
        let rec: DonationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.tenant, TenantId::default_tenant());
        assert_eq!(rec.channel, Channel::Webhook);
        assert_eq!(rec.amount.get(), 300);
    }

    #[test]
    fn amount_cap_is_inclusive() {
        assert_eq!(Amount::new(Amount::MAX).unwrap().get(), Amount::MAX);
        assert!(Amount::new(Amount::MAX + 1).is_err());
        assert!(serde_json::from_str::<Amount>("9223372036854775807").is_err());
    }

    #[test]
    fn running_total_checked_plus() {
        let t = RunningTotal::default()
            .checked_plus(Amount::new(500).unwrap())
            .unwrap();
        assert_eq!(t.total_amount, 500);
        assert_eq!(t.donation_count, 1);
    }

    #[test]
    fn running_total_overflow_is_none() {
        let near_max = RunningTotal {
            total_amount: i64::MAX - 10,
            donation_count: 3,
        };
        assert_eq!(near_max.checked_plus(Amount::new(11).unwrap()), None);
        assert!(near_max.checked_plus(Amount::new(10).unwrap()).is_some());
    }

    proptest! {
        #[test]
        fn amount_parse_matches_display(n in 1i64..=Amount::MAX) {
            let a = Amount::new(n).unwrap();
            prop_assert_eq!(Amount::parse(&a.to_string()).unwrap(), a);
        }
    }
}
