//! # Cryptographic Error Types
//!
//! Structured errors for signature verification and payload decryption.
//! Uses `thiserror` for ergonomic error definitions with diagnostic context.

use thiserror::Error;

/// Errors from CheckMacValue verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The parameter set carried no `CheckMacValue` field.
    #[error("CheckMacValue missing from parameter set")]
    Missing,

    /// The supplied CheckMacValue does not match the recomputed one.
    #[error("CheckMacValue mismatch")]
    Mismatch,
}

/// Stage of the notification-payload pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptStage {
    /// Hash key or IV is not 16 bytes.
    Key,
    /// Input is not valid base64.
    Base64,
    /// AES-CBC decryption or PKCS#7 unpadding failed.
    Decrypt,
    /// Plaintext or percent-decoded text is not UTF-8.
    Decode,
    /// Decoded text is not the expected JSON.
    Json,
}

impl DecryptStage {
    /// Lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Base64 => "base64",
            Self::Decrypt => "decrypt",
            Self::Decode => "decode",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for DecryptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error surfaced for any failure while recovering a payload.
///
/// `detail` is diagnostic text for operator logs. It never contains key
/// material and must not be echoed to the gateway or the donor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("payload decryption failed at {stage} stage: {detail}")]
pub struct DecryptionError {
    pub stage: DecryptStage,
    pub detail: String,
}

impl DecryptionError {
    pub(crate) fn new(stage: DecryptStage, detail: impl std::fmt::Display) -> Self {
        Self {
            stage,
            detail: detail.to_string(),
        }
    }
}
