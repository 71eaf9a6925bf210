//! # Gateway Credential
//!
//! The merchant id / hash key / hash IV triple issued by the payment gateway.
//! The hash key and IV double as the CheckMacValue salt and as the AES-128
//! key and IV for encrypted notifications.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ConfigurationError;

/// A complete gateway credential scoped to one tenant.
///
/// All three fields are non-empty by construction. Secrets are zeroed on drop
/// and redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    merchant_id: String,
    hash_key: String,
    hash_iv: String,
}

impl Credential {
    /// Build a credential, rejecting any empty (or whitespace-only) field.
    pub fn new(
        merchant_id: impl Into<String>,
        hash_key: impl Into<String>,
        hash_iv: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let merchant_id = merchant_id.into();
        let hash_key = hash_key.into();
        let hash_iv = hash_iv.into();

        let missing: Vec<&str> = [
            ("MerchantID", &merchant_id),
            ("HashKey", &hash_key),
            ("HashIV", &hash_iv),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ConfigurationError::Incomplete {
                missing: missing.join(", "),
            });
        }

        Ok(Self {
            merchant_id,
            hash_key,
            hash_iv,
        })
    }

    /// Build a credential from optional parts, as read from env or storage.
    pub fn from_parts(
        merchant_id: Option<&str>,
        hash_key: Option<&str>,
        hash_iv: Option<&str>,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            merchant_id.unwrap_or_default(),
            hash_key.unwrap_or_default(),
            hash_iv.unwrap_or_default(),
        )
    }

    /// The gateway merchant id.
    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    /// The hash key (secret A).
    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    /// The hash IV (secret B).
    pub fn hash_iv(&self) -> &str {
        &self.hash_iv
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("merchant_id", &self.merchant_id)
            .field("hash_key", &"[REDACTED]")
            .field("hash_iv", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_credential_constructs() {
        let c = Credential::new("M1", "k", "v").unwrap();
        assert_eq!(c.merchant_id(), "M1");
        assert_eq!(c.hash_key(), "k");
        assert_eq!(c.hash_iv(), "v");
    }

    #[test]
    fn empty_fields_are_reported() {
        let err = Credential::new("", "k", " ").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Incomplete {
                missing: "MerchantID, HashIV".to_string()
            }
        );
    }

    #[test]
    fn from_parts_treats_none_as_missing() {
        assert!(Credential::from_parts(Some("M1"), None, Some("v")).is_err());
        assert!(Credential::from_parts(Some("M1"), Some("k"), Some("v")).is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = Credential::new("M1", "supersecretkey", "supersecretiv").unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("M1"));
        assert!(!dbg.contains("supersecret"));
    }
}
