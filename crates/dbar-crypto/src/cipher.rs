//! # Notification Payload Cipher
//!
//! The gateway encrypts the `Data` field of server-to-server notifications
//! with AES-128-CBC and PKCS#7 padding. The key is the raw UTF-8 bytes of the
//! hash key and the IV is the raw UTF-8 bytes of the hash IV; both must be
//! exactly 16 bytes. This derivation is fixed by the gateway and must not be
//! "improved" (hashing the secret, decoding it as hex) or interoperability
//! breaks.
//!
//! The plaintext is not JSON directly: it is JSON passed through the
//! gateway URL encoder. Decryption therefore runs
//! base64 → AES-CBC → UTF-8 → `+`-to-space → percent-decode → JSON, and every
//! failure along that chain collapses into one [`DecryptionError`] tagged
//! with the stage that failed.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dbar_core::{ConfigurationError, Credential};
use serde::de::DeserializeOwned;

use crate::encoding::{gateway_decode, gateway_encode};
use crate::error::{DecryptStage, DecryptionError};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const AES_KEY_LEN: usize = 16;

/// Borrow the 16-byte key and IV from the credential.
pub fn key_material(credential: &Credential) -> Result<([u8; 16], [u8; 16]), ConfigurationError> {
    let key = fixed16(credential.hash_key(), "HashKey")?;
    let iv = fixed16(credential.hash_iv(), "HashIV")?;
    Ok((key, iv))
}

fn fixed16(secret: &str, field: &'static str) -> Result<[u8; 16], ConfigurationError> {
    secret
        .as_bytes()
        .try_into()
        .map_err(|_| ConfigurationError::InvalidKeyLength {
            field,
            actual: secret.len(),
        })
}

/// Decrypt a base64 `Data` field into the plaintext JSON text.
pub fn decrypt_to_string(ciphertext_b64: &str, credential: &Credential) -> Result<String, DecryptionError> {
    let (key, iv) =
        key_material(credential).map_err(|e| DecryptionError::new(DecryptStage::Key, e))?;

    let ciphertext = STANDARD
        .decode(ciphertext_b64.trim())
        .map_err(|e| DecryptionError::new(DecryptStage::Base64, e))?;

    let plaintext = Aes128CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| DecryptionError::new(DecryptStage::Decrypt, "bad block length or padding"))?;

    let encoded = String::from_utf8(plaintext)
        .map_err(|e| DecryptionError::new(DecryptStage::Decode, e))?;

    gateway_decode(&encoded).map_err(|e| DecryptionError::new(DecryptStage::Decode, e))
}

/// Decrypt and parse the payload as an arbitrary JSON value.
pub fn decrypt(ciphertext_b64: &str, credential: &Credential) -> Result<serde_json::Value, DecryptionError> {
    decrypt_as(ciphertext_b64, credential)
}

/// Decrypt and deserialize the payload into `T`.
pub fn decrypt_as<T: DeserializeOwned>(
    ciphertext_b64: &str,
    credential: &Credential,
) -> Result<T, DecryptionError> {
    let json = decrypt_to_string(ciphertext_b64, credential)?;
    serde_json::from_str(&json).map_err(|e| DecryptionError::new(DecryptStage::Json, e))
}

/// Encrypt plaintext JSON text the way the gateway does.
///
/// Used by the test-payload generator and the operator CLI.
pub fn encrypt_str(plaintext: &str, credential: &Credential) -> Result<String, ConfigurationError> {
    let (key, iv) = key_material(credential)?;
    let encoded = gateway_encode(plaintext);
    let ciphertext = Aes128CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(encoded.as_bytes());
    Ok(STANDARD.encode(ciphertext))
}

/// Serialize `value` to JSON and encrypt it.
pub fn encrypt(value: &serde_json::Value, credential: &Credential) -> Result<String, ConfigurationError> {
    encrypt_str(&value.to_string(), credential)
}
