//! # dbar-crypto: Gateway Integrity Primitives
//!
//! Everything DonationBar needs to talk to ECPay without trusting the
//! network:
//!
//! - [`encoding`]: the gateway's URL-encoding dialect, shared by the
//!   signature and the payload cipher.
//! - [`check_mac`]: CheckMacValue signing and constant-time verification.
//! - [`cipher`]: AES-128-CBC decryption (and encryption, for tooling) of
//!   webhook `Data` payloads.
//!
//! All operations are synchronous and allocation-light; callers run them
//! inline on the async executor.

pub mod check_mac;
pub mod cipher;
pub mod encoding;
pub mod error;

pub use check_mac::{sign, verify, verify_params, CHECK_MAC_FIELD};
pub use cipher::{decrypt, decrypt_as, encrypt, encrypt_str};
pub use encoding::{gateway_decode, gateway_encode};
pub use error::{DecryptStage, DecryptionError, SignatureError};
