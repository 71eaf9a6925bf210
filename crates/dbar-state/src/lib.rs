//! # dbar-state: Donation Ledger State
//!
//! The stateful half of payment reconciliation:
//!
//! - [`DonationStore`]: the storage seam. Backends are chosen once at
//!   startup; nothing above this crate branches on which one is live.
//! - [`MemoryStore`] and [`JsonFileStore`]: single-process backends. The
//!   Postgres backend lives with the HTTP service.
//! - [`CredentialResolver`]: per-tenant gateway credential lookup with a
//!   static fallback and one-time migration into storage.
//! - [`Reconciler`]: the only path by which a donation enters the ledger.
//!
//! ## Invariants
//!
//! - For a given tenant, a trade number appears in the ledger at most once.
//! - A tenant's running total equals the sum of its record amounts; the two
//!   are written in one atomic unit.

pub mod error;
pub mod notifier;
pub mod reconciler;
pub mod resolver;
pub mod store;

pub use error::{ReconcileError, ResolveError, StorageError};
pub use notifier::{DonationNotifier, NoopNotifier};
pub use reconciler::Reconciler;
pub use resolver::CredentialResolver;
pub use store::json_file::JsonFileStore;
pub use store::memory::MemoryStore;
pub use store::{DonationStore, PendingOrder, PENDING_ORDER_TTL_DAYS};
