//! # dbar-core: Foundational Types for DonationBar
//!
//! Every other crate in the workspace depends on `dbar-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** [`TenantId`] and [`TradeNo`] are
//!    validated at construction. A trade number is the idempotency key of the
//!    ledger, so a bare `String` is never accepted where one is expected.
//!
//! 2. **[`Amount`] is always strictly positive.** Gateway callbacks carry
//!    amounts as decimal strings; [`Amount::parse`] rejects anything that is
//!    not a plain positive integer, so a zero or negative credit cannot be
//!    represented.
//!
//! 3. **[`Credential`] is complete or absent.** A credential with an empty
//!    merchant id, hash key or hash IV cannot be constructed. Payment flows
//!    that cannot obtain one fail closed with [`ConfigurationError`].
//!
//! ## Crate Policy
//!
//! - No dependencies on other `dbar-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod credential;
pub mod error;
pub mod identity;
pub mod payment;
pub mod progress;

pub use credential::Credential;
pub use error::{ConfigurationError, ValidationError};
pub use identity::{TenantId, TradeNo};
pub use payment::{Amount, ApplyOutcome, Channel, DonationRecord, PaymentEvent, RunningTotal};
pub use progress::{Goal, Progress, RECENT_DONATIONS};
