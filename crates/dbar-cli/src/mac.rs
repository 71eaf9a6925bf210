//! # Mac Subcommand
//!
//! CheckMacValue signing and verification over `key=value` pairs, as the
//! gateway posts them. Values are taken literally: pass them already
//! form-decoded.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use dbar_crypto::check_mac::canonical_string;
use dbar_crypto::{sign, verify_params, SignatureError, CHECK_MAC_FIELD};

use crate::KeyArgs;

/// Arguments for the `dbar mac` subcommand.
#[derive(Args, Debug)]
pub struct MacArgs {
    #[command(subcommand)]
    pub command: MacCommand,
}

/// Mac subcommands.
#[derive(Subcommand, Debug)]
pub enum MacCommand {
    /// Print the CheckMacValue for a parameter set.
    Sign {
        #[command(flatten)]
        keys: KeyArgs,
        /// Also print the canonical string that was hashed. It embeds the
        /// HashKey and HashIV.
        #[arg(long)]
        explain: bool,
        /// Parameters as `key=value`. A `CheckMacValue` pair is ignored.
        #[arg(value_name = "KEY=VALUE", required = true)]
        pairs: Vec<String>,
    },

    /// Check a parameter set that carries its own `CheckMacValue` pair.
    Verify {
        #[command(flatten)]
        keys: KeyArgs,
        /// Parameters as `key=value`, including `CheckMacValue=<hex>`.
        #[arg(value_name = "KEY=VALUE", required = true)]
        pairs: Vec<String>,
    },
}

/// Execute the mac subcommand.
pub fn run_mac(args: &MacArgs) -> Result<u8> {
    match &args.command {
        MacCommand::Sign {
            keys,
            explain,
            pairs,
        } => cmd_sign(keys, pairs, *explain),
        MacCommand::Verify { keys, pairs } => cmd_verify(keys, pairs),
    }
}

/// Split `key=value` arguments. Only the first `=` separates; keys must be
/// non-empty and unique.
pub fn parse_pairs(raw: &[String]) -> Result<Vec<(String, String)>> {
    let mut pairs: Vec<(String, String)> = Vec::with_capacity(raw.len());
    for arg in raw {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("expected KEY=VALUE, got {arg:?}");
        };
        if key.is_empty() {
            bail!("empty key in {arg:?}");
        }
        if pairs.iter().any(|(k, _)| k == key) {
            bail!("duplicate key {key:?}");
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}

fn as_refs(pairs: &[(String, String)]) -> impl Iterator<Item = (&str, &str)> {
    pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
}

fn merchant_of(pairs: &[(String, String)]) -> Option<&str> {
    pairs
        .iter()
        .find(|(k, _)| k == "MerchantID")
        .map(|(_, v)| v.as_str())
}

fn cmd_sign(keys: &KeyArgs, raw: &[String], explain: bool) -> Result<u8> {
    let pairs = parse_pairs(raw)?;
    let credential = keys.credential(merchant_of(&pairs))?;

    if pairs.iter().any(|(k, _)| k == CHECK_MAC_FIELD) {
        tracing::info!("ignoring supplied {CHECK_MAC_FIELD}");
    }
    if explain {
        println!("{}", canonical_string(as_refs(&pairs), &credential));
    }
    println!("{}", sign(as_refs(&pairs), &credential));

    Ok(0)
}

fn cmd_verify(keys: &KeyArgs, raw: &[String]) -> Result<u8> {
    let pairs = parse_pairs(raw)?;
    let credential = keys.credential(merchant_of(&pairs))?;

    match verify_params(as_refs(&pairs), &credential) {
        Ok(()) => {
            println!("OK: {CHECK_MAC_FIELD} is valid");
            Ok(0)
        }
        Err(SignatureError::Missing) => bail!("no {CHECK_MAC_FIELD}=<hex> pair given"),
        Err(e) => {
            println!("FAIL: {e}");
            println!("  expected: {}", sign(as_refs(&pairs), &credential));
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> KeyArgs {
        KeyArgs {
            hash_key: "k".into(),
            hash_iv: "v".into(),
            merchant_id: None,
        }
    }

    fn args(pairs: &[&str]) -> Vec<String> {
        pairs.iter().map(|s| s.to_string()).collect()
    }

    const SIG: &str = "656A71ACA699CD210B42761C50C1DFA6D0E0F5D641EEF4D6BE43BEB211F9D84A";

    #[test]
    fn pairs_split_on_first_equals() {
        let pairs = parse_pairs(&args(&["a=1", "b=x=y", "c="])).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x=y".to_string()),
                ("c".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn malformed_pairs_are_rejected() {
        assert!(parse_pairs(&args(&["novalue"])).is_err());
        assert!(parse_pairs(&args(&["=1"])).is_err());
        assert!(parse_pairs(&args(&["a=1", "a=2"])).is_err());
    }

    #[test]
    fn merchant_id_is_picked_from_pairs() {
        let pairs = parse_pairs(&args(&["MerchantID=M1", "TradeAmt=100"])).unwrap();
        assert_eq!(merchant_of(&pairs), Some("M1"));
        assert_eq!(keys().credential(merchant_of(&pairs)).unwrap().merchant_id(), "M1");
    }

    #[test]
    fn sign_succeeds() {
        let raw = args(&["MerchantID=M1", "MerchantTradeNo=T1", "TradeAmt=100"]);
        assert_eq!(cmd_sign(&keys(), &raw, true).unwrap(), 0);
    }

    #[test]
    fn verify_accepts_known_signature() {
        let raw = args(&[
            "MerchantID=M1",
            "MerchantTradeNo=T1",
            "TradeAmt=100",
            format!("CheckMacValue={SIG}").as_str(),
        ]);
        assert_eq!(cmd_verify(&keys(), &raw).unwrap(), 0);
    }

    #[test]
    fn verify_flags_tampered_amount() {
        let raw = args(&[
            "MerchantID=M1",
            "MerchantTradeNo=T1",
            "TradeAmt=101",
            format!("CheckMacValue={SIG}").as_str(),
        ]);
        assert_eq!(cmd_verify(&keys(), &raw).unwrap(), 1);
    }

    #[test]
    fn verify_without_signature_is_an_error() {
        let raw = args(&["MerchantID=M1", "TradeAmt=100"]);
        assert!(cmd_verify(&keys(), &raw).is_err());
    }
}
