//! # CheckMacValue
//!
//! The gateway's integrity check value over a flat parameter set.
//!
//! ## Algorithm
//!
//! 1. Drop the `CheckMacValue` field itself.
//! 2. Sort the remaining keys byte-wise ascending.
//! 3. Join as `key=value` pairs with `&`, values exactly as transmitted.
//! 4. Wrap as `HashKey=<key>&<joined>&HashIV=<iv>`.
//! 5. Apply [`gateway_encode`](crate::encoding::gateway_encode).
//! 6. Lowercase.
//! 7. SHA-256 over the bytes, rendered as uppercase hex.
//!
//! Values are hashed as the literal strings that travel on the wire. A
//! caller that reformats a number (`"0100"` vs `"100"`) produces a different
//! signature, by construction.

use std::collections::BTreeMap;

use dbar_core::Credential;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::encoding::gateway_encode;
use crate::error::SignatureError;

/// Wire name of the signature field.
pub const CHECK_MAC_FIELD: &str = "CheckMacValue";

/// Build the encoded, lowercased string that gets hashed.
///
/// Exposed for operator diagnostics (`dbar mac sign --explain`); never log
/// it in production, since it embeds the hash key and IV.
pub fn canonical_string<'a, I>(params: I, credential: &Credential) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<&str, &str> = params
        .into_iter()
        .filter(|(k, _)| *k != CHECK_MAC_FIELD)
        .collect();

    let mut raw = format!("HashKey={}", credential.hash_key());
    for (k, v) in &sorted {
        raw.push('&');
        raw.push_str(k);
        raw.push('=');
        raw.push_str(v);
    }
    raw.push_str("&HashIV=");
    raw.push_str(credential.hash_iv());

    gateway_encode(&raw).to_ascii_lowercase()
}

/// Compute the CheckMacValue for `params` (64 uppercase hex characters).
pub fn sign<'a, I>(params: I, credential: &Credential) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let digest = Sha256::digest(canonical_string(params, credential).as_bytes());
    to_upper_hex(&digest)
}

/// Recompute the signature over `params` and compare it with `signature`.
///
/// The comparison is exact and case-sensitive, in constant time with
/// respect to the content of equal-length inputs.
pub fn verify<'a, I>(params: I, signature: &str, credential: &Credential) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let expected = sign(params, credential);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Verify a parameter set that carries its own `CheckMacValue` field.
pub fn verify_params<'a, I>(params: I, credential: &Credential) -> Result<(), SignatureError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let params: Vec<(&str, &str)> = params.into_iter().collect();
    let supplied = params
        .iter()
        .find(|(k, _)| *k == CHECK_MAC_FIELD)
        .map(|(_, v)| *v)
        .ok_or(SignatureError::Missing)?;

    if verify(params.iter().copied(), supplied, credential) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn to_upper_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
