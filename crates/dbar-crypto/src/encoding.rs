//! # Gateway URL Encoding
//!
//! ECPay hashes and encrypts text in URI-component form: every byte except
//! ASCII alphanumerics and `-_.!~*'()` is percent-encoded as UTF-8 with
//! uppercase hex. The one departure is space, which becomes `+` instead of
//! `%20`.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes the gateway encoder leaves literal, besides alphanumerics.
const GATEWAY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Encode `input` the way the gateway does before hashing or encrypting.
///
/// The result is pure ASCII.
pub fn gateway_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for chunk in utf8_percent_encode(input, GATEWAY_ENCODE_SET) {
        if chunk == "%20" {
            out.push('+');
        } else {
            out.push_str(chunk);
        }
    }
    out
}

/// Reverse [`gateway_encode`]: `+` becomes space, then standard
/// percent-decoding.
///
/// Fails only when the decoded bytes are not UTF-8. Malformed escapes such
/// as a lone `%` pass through literally, as in most percent decoders.
pub fn gateway_decode(input: &str) -> Result<String, std::str::Utf8Error> {
    let plus_as_space = input.replace('+', " ");
    percent_decode_str(&plus_as_space)
        .decode_utf8()
        .map(|cow| cow.into_owned())
}
