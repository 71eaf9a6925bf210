//! # dbar-gateway: ECPay Protocol Layer
//!
//! Outbound, [`checkout`] builds the signed AIO order and the auto-submitting
//! form that hands the donor to the gateway.
//!
//! Inbound, the gateway confirms a payment through up to three independent
//! channels, each normalized into a [`dbar_core::PaymentEvent`] and handed
//! to the one [`dbar_state::Reconciler`]:
//!
//! | Channel | Route | Authentication |
//! |---|---|---|
//! | Return | `ReturnURL` server POST | MerchantID + CheckMacValue |
//! | Redirect | `OrderResultURL` browser POST | MerchantID + CheckMacValue |
//! | Webhook / periodic billing | envelope with AES `Data` | MerchantID + decryption |
//!
//! [`ConfirmationService`] runs every channel under one deadline and maps
//! the result to the gateway's [`Ack`] protocol. Internal error text never
//! reaches the wire.

pub mod ack;
pub mod callback;
pub mod checkout;
pub mod error;
pub mod service;
pub mod test_payload;
pub mod webhook;
mod wire;

pub use ack::Ack;
pub use callback::CallbackParams;
pub use checkout::{CheckoutOrder, GatewayEnvironment, OrderRequest};
pub use error::ChannelError;
pub use service::{ChannelOutcome, Confirmation, ConfirmationService, IgnoreReason};
pub use webhook::{WebhookData, WebhookEnvelope};
