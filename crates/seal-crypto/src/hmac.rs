//! # HMAC-SHA256
//!
//! Symmetric signing for sealed artifacts and action contracts.
//!
//! ## Security Invariant
//!
//! - Input is `&CanonicalBytes` only.
//! - Raw key bytes are zeroized once the keyed MAC state is derived, and the
//!   key is never formatted by `Debug`.
//! - Comparison is constant-time (`subtle::ConstantTimeEq`).

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use hmac::{Hmac, Mac};
use seal_core::CanonicalBytes;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Shared secret for HMAC-SHA256, held as pre-keyed MAC state.
#[derive(Clone)]
pub struct HmacKey {
    mac: HmacSha256,
}

impl HmacKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.is_empty() {
            return Err(CryptoError::KeyError("HMAC key must not be empty".into()));
        }
        let mac = HmacSha256::new_from_slice(&bytes)
            .map_err(|e| CryptoError::KeyError(format!("invalid HMAC key: {e}")))?;
        Ok(Self { mac })
    }

    /// Decode a standard base64 key, as supplied via `--key` or the
    /// environment.
    pub fn from_base64(b64: &str) -> Result<Self, CryptoError> {
        let bytes = B64
            .decode(b64.trim())
            .map_err(|e| CryptoError::KeyError(format!("invalid base64 HMAC key: {e}")))?;
        Self::from_bytes(bytes)
    }

    pub fn sign(&self, data: &CanonicalBytes) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(data.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }

    pub fn sign_base64(&self, data: &CanonicalBytes) -> String {
        B64.encode(self.sign(data))
    }

    pub fn sign_hex(&self, data: &CanonicalBytes) -> String {
        hex::encode(self.sign(data))
    }

    /// Constant-time check of a raw tag.
    pub fn verify(&self, data: &CanonicalBytes, tag: &[u8]) -> bool {
        let expected = self.sign(data);
        if tag.len() != expected.len() {
            return false;
        }
        expected.ct_eq(tag).into()
    }

    /// Verify a base64 tag. Undecodable input is simply invalid.
    pub fn verify_base64(&self, data: &CanonicalBytes, tag_b64: &str) -> bool {
        B64.decode(tag_b64.trim())
            .map(|tag| self.verify(data, &tag))
            .unwrap_or(false)
    }

    /// Verify a hex tag. Undecodable input is simply invalid.
    pub fn verify_hex(&self, data: &CanonicalBytes, tag_hex: &str) -> bool {
        hex::decode(tag_hex.trim())
            .map(|tag| self.verify(data, &tag))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacKey(<private>)")
    }
}
