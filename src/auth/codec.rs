//! Credential transport codec.
//!
//! The client never sends plaintext credentials. It encrypts them with a key
//! derived from its device token (itself an AEAD ciphertext under the server
//! static secret) plus a coarse device-class descriptor parsed from the
//! `User-Agent` header. Decrypting a leaked access log therefore requires
//! both the server secret and the original request headers.
//!
//! Wire format for every ciphertext: `Base64(nonce (12 bytes) || ciphertext)`.

use base64ct::{Base64, Encoding};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use super::error::AuthError;

const NONCE_LEN: usize = 12;

/// Derive the per-device transport key from the device id, the coarse device
/// descriptor, and the server static secret. Deterministic so both sides
/// re-derive the same key per request.
#[must_use]
pub fn derive_device_key(secret: &SecretString, device_id: &str, descriptor: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"device-key:v1|");
    hasher.update(device_id.as_bytes());
    hasher.update(b"|");
    hasher.update(descriptor.as_bytes());
    hasher.update(b"|");
    hasher.update(secret.expose_secret().as_bytes());
    hasher.finalize().into()
}

fn static_key(secret: &SecretString) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"device-token:v1|");
    hasher.update(secret.expose_secret().as_bytes());
    hasher.finalize().into()
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("encryption failure: {e}")))?;

    let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    framed.extend_from_slice(&nonce_bytes);
    framed.extend_from_slice(&ciphertext);

    Ok(Base64::encode_string(&framed))
}

fn open(key: &[u8; 32], encoded: &str) -> Option<Vec<u8>> {
    let framed = Base64::decode_vec(encoded).ok()?;
    if framed.len() < NONCE_LEN {
        return None;
    }

    let (nonce_bytes, ciphertext) = framed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext).ok()
}

/// Mint an opaque device token carrying the device id, sealed under the
/// server static secret. Handed to clients at enrollment.
///
/// # Errors
/// Returns `Internal` if encryption fails.
pub fn seal_device_token(secret: &SecretString, device_id: &str) -> Result<String, AuthError> {
    seal(&static_key(secret), device_id.as_bytes())
}

/// Recover the device id from a client-declared device token.
///
/// Any failure (bad base64, truncation, wrong secret) collapses to
/// `InvalidDevice`; the caller learns nothing about which step broke.
///
/// # Errors
/// Returns `InvalidDevice` when the token cannot be opened.
pub fn open_device_token(secret: &SecretString, device_token: &str) -> Result<String, AuthError> {
    open(&static_key(secret), device_token)
        .and_then(|plain| String::from_utf8(plain).ok())
        .ok_or(AuthError::InvalidDevice)
}

/// Encrypt a credential field under the derived device key.
///
/// # Errors
/// Returns `Internal` if encryption fails.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> Result<String, AuthError> {
    seal(key, plaintext.as_bytes())
}

/// Decrypt a credential field. Wrong key and malformed input are not
/// distinguished, to avoid an oracle.
///
/// # Errors
/// Returns `InvalidData` on any decryption or format error.
pub fn decrypt(key: &[u8; 32], ciphertext: &str) -> Result<String, AuthError> {
    open(key, ciphertext)
        .and_then(|plain| String::from_utf8(plain).ok())
        .ok_or(AuthError::InvalidData("Credential"))
}

/// Coarse device-class descriptor from the `User-Agent` header. Only feeds
/// key derivation, so granularity stays deliberately low.
#[must_use]
pub fn device_class(user_agent: Option<&str>) -> &'static str {
    match user_agent {
        Some(ua) if ua.contains("Mobile") || ua.contains("Android") || ua.contains("iPhone") => {
            "mobile"
        }
        Some(_) => "desktop",
        None => "unknown",
    }
}
