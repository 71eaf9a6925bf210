//! # dbar-cli: Operator Tooling
//!
//! The `dbar` binary exposes the integrity primitives from `dbar-crypto`
//! without a running server.
//!
//! ## Subcommands
//!
//! - `dbar mac sign` / `dbar mac verify`: CheckMacValue over `key=value`
//!   pairs.
//! - `dbar payload decrypt` / `dbar payload encrypt`: the AES-128-CBC
//!   webhook `Data` cipher.
//!
//! ```bash
//! export HASH_KEY=pwFHCqoQZGmho4w6 HASH_IV=EkRm7iFT261dpevs
//! dbar mac sign MerchantID=3002607 MerchantTradeNo=DN1 TradeAmt=500
//! dbar payload decrypt --file data.txt
//! ```

pub mod mac;
pub mod payload;

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use dbar_core::Credential;

/// Merchant id used when none is given; it does not enter any digest.
const PLACEHOLDER_MERCHANT: &str = "-";

/// Merchant secrets shared by every subcommand.
///
/// Prefer the environment variables over flags so the secrets stay out of
/// shell history and process listings.
#[derive(Args)]
pub struct KeyArgs {
    /// Merchant HashKey.
    #[arg(long, env = "HASH_KEY", hide_env_values = true)]
    pub hash_key: String,

    /// Merchant HashIV.
    #[arg(long, env = "HASH_IV", hide_env_values = true)]
    pub hash_iv: String,

    /// Merchant id.
    #[arg(long, env = "MERCHANT_ID")]
    pub merchant_id: Option<String>,
}

impl KeyArgs {
    /// Build a credential, falling back to `fallback_merchant` and then to a
    /// placeholder when no merchant id was given.
    pub fn credential(&self, fallback_merchant: Option<&str>) -> Result<Credential> {
        let merchant = self
            .merchant_id
            .as_deref()
            .or(fallback_merchant)
            .unwrap_or(PLACEHOLDER_MERCHANT);
        Credential::new(merchant, self.hash_key.as_str(), self.hash_iv.as_str())
            .map_err(|e| anyhow!("invalid merchant credential: {e}"))
    }
}

impl std::fmt::Debug for KeyArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyArgs")
            .field("hash_key", &"[REDACTED]")
            .field("hash_iv", &"[REDACTED]")
            .field("merchant_id", &self.merchant_id)
            .finish()
    }
}

/// Read a subcommand's input from an inline argument or a file.
///
/// Exactly one of the two must be present. Surrounding whitespace is
/// trimmed.
pub fn read_input(inline: Option<&str>, file: Option<&PathBuf>) -> Result<String> {
    match (inline, file) {
        (Some(s), None) => Ok(s.trim().to_string()),
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read input: {}", path.display()))?;
            Ok(content.trim().to_string())
        }
        (Some(_), Some(_)) => bail!("give either an inline value or --file, not both"),
        (None, None) => bail!("no input: give an inline value or --file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(merchant: Option<&str>) -> KeyArgs {
        KeyArgs {
            hash_key: "pwFHCqoQZGmho4w6".into(),
            hash_iv: "EkRm7iFT261dpevs".into(),
            merchant_id: merchant.map(str::to_string),
        }
    }

    #[test]
    fn merchant_id_precedence() {
        assert_eq!(keys(Some("A")).credential(Some("B")).unwrap().merchant_id(), "A");
        assert_eq!(keys(None).credential(Some("B")).unwrap().merchant_id(), "B");
        assert_eq!(keys(None).credential(None).unwrap().merchant_id(), PLACEHOLDER_MERCHANT);
    }

    #[test]
    fn empty_key_is_rejected() {
        let mut args = keys(None);
        args.hash_key.clear();
        assert!(args.credential(None).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", keys(Some("3002607")));
        assert!(!rendered.contains("pwFHCqoQZGmho4w6"));
        assert!(!rendered.contains("EkRm7iFT261dpevs"));
        assert!(rendered.contains("3002607"));
    }

    #[test]
    fn input_from_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "  abc\n").unwrap();
        assert_eq!(read_input(None, Some(&path)).unwrap(), "abc");
        assert_eq!(read_input(Some(" xyz "), None).unwrap(), "xyz");
    }

    #[test]
    fn input_requires_exactly_one_source() {
        let path = PathBuf::from("unused");
        assert!(read_input(None, None).is_err());
        assert!(read_input(Some("a"), Some(&path)).is_err());
        assert!(read_input(None, Some(&PathBuf::from("/nonexistent/dbar-input"))).is_err());
    }
}
