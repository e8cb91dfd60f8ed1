//! # Record Encryption
//!
//! Records at rest are NDJSON lines:
//!
//! ```json
//! {"record_id":"R-1","key_id":"k-2026q1","nonce":"<b64>","ciphertext":"<b64>"}
//! ```
//!
//! Sealed with ChaCha20-Poly1305 under a 32-byte key and a random 96-bit
//! nonce. The record id is the associated data, so a ciphertext cannot be
//! moved to another record id without failing authentication.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::RekeyError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// A named data key.
#[derive(Clone)]
pub struct RecordKey {
    key_id: String,
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl RecordKey {
    pub fn new(key_id: impl Into<String>, key: [u8; KEY_LEN]) -> Self {
        Self {
            key_id: key_id.into(),
            key: Zeroizing::new(key),
        }
    }

    pub fn generate(key_id: impl Into<String>) -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        rand::rngs::OsRng.fill_bytes(&mut key[..]);
        Self {
            key_id: key_id.into(),
            key,
        }
    }

    /// Decode a standard base64 key. With no `key_id`, the id is derived
    /// from the key's SHA-256 fingerprint.
    pub fn from_base64(key_id: Option<&str>, b64: &str) -> Result<Self, RekeyError> {
        let bytes = Zeroizing::new(
            B64.decode(b64.trim())
                .map_err(|e| RekeyError::Config(format!("key is not base64: {e}")))?,
        );
        if bytes.len() != KEY_LEN {
            return Err(RekeyError::Config(format!(
                "key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&bytes);
        let key_id = match key_id {
            Some(id) => id.to_string(),
            None => fingerprint_id(&key[..]),
        };
        Ok(Self { key_id, key })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        let key: &[u8; KEY_LEN] = &self.key;
        ChaCha20Poly1305::new(key.into())
    }
}

impl std::fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordKey({}, <private>)", self.key_id)
    }
}

/// `k-` plus the first 16 hex digits of the key's SHA-256.
pub fn fingerprint_id(key: &[u8]) -> String {
    let hex = seal_core::sha256_raw(key).to_hex();
    format!("k-{}", &hex[..16])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub record_id: String,
    pub key_id: String,
    pub nonce: String,
    pub ciphertext: String,
}

impl EncryptedRecord {
    pub fn seal(
        record_id: impl Into<String>,
        plaintext: &[u8],
        key: &RecordKey,
    ) -> Result<Self, RekeyError> {
        let record_id = record_id.into();
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let ciphertext = key
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: record_id.as_bytes(),
                },
            )
            .map_err(|e| RekeyError::Encrypt(e.to_string()))?;
        Ok(Self {
            record_id,
            key_id: key.key_id.clone(),
            nonce: B64.encode(nonce),
            ciphertext: B64.encode(ciphertext),
        })
    }

    pub fn open(&self, key: &RecordKey) -> Result<Zeroizing<Vec<u8>>, RekeyError> {
        if self.key_id != key.key_id {
            return Err(RekeyError::UnknownKey {
                record_id: self.record_id.clone(),
                expected: key.key_id.clone(),
                found: self.key_id.clone(),
            });
        }
        let decrypt_err = || RekeyError::Decrypt {
            record_id: self.record_id.clone(),
        };
        let nonce = B64.decode(&self.nonce).map_err(|_| decrypt_err())?;
        if nonce.len() != NONCE_LEN {
            return Err(decrypt_err());
        }
        let ciphertext = B64.decode(&self.ciphertext).map_err(|_| decrypt_err())?;
        key.cipher()
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: self.record_id.as_bytes(),
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| decrypt_err())
    }

    /// Decrypt under `previous` and seal again under `current` with a fresh
    /// nonce.
    pub fn reencrypt(&self, previous: &RecordKey, current: &RecordKey) -> Result<Self, RekeyError> {
        let plaintext = self.open(previous)?;
        Self::seal(self.record_id.clone(), &plaintext, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let key = RecordKey::generate("k1");
        let rec = EncryptedRecord::seal("R-1", b"claim: ok", &key).unwrap();
        assert_eq!(rec.key_id, "k1");
        assert_eq!(&rec.open(&key).unwrap()[..], b"claim: ok");
    }

    #[test]
    fn record_id_is_bound() {
        let key = RecordKey::generate("k1");
        let mut rec = EncryptedRecord::seal("R-1", b"x", &key).unwrap();
        rec.record_id = "R-2".into();
        assert!(matches!(rec.open(&key), Err(RekeyError::Decrypt { .. })));
    }

    #[test]
    fn same_id_different_material_fails_auth() {
        let a = RecordKey::new("k1", [1u8; KEY_LEN]);
        let b = RecordKey::new("k1", [2u8; KEY_LEN]);
        let rec = EncryptedRecord::seal("R-1", b"x", &a).unwrap();
        assert!(matches!(rec.open(&b), Err(RekeyError::Decrypt { .. })));
    }

    #[test]
    fn reencrypt_moves_to_new_key() {
        let old = RecordKey::new("old", [1u8; KEY_LEN]);
        let new = RecordKey::new("new", [2u8; KEY_LEN]);
        let rec = EncryptedRecord::seal("R-1", b"payload", &old).unwrap();
        let moved = rec.reencrypt(&old, &new).unwrap();
        assert_eq!(moved.key_id, "new");
        assert_ne!(moved.nonce, rec.nonce);
        assert_eq!(&moved.open(&new).unwrap()[..], b"payload");
        assert!(matches!(moved.open(&old), Err(RekeyError::UnknownKey { .. })));
    }

    #[test]
    fn base64_keys_and_fingerprints() {
        let b64 = B64.encode([7u8; KEY_LEN]);
        let key = RecordKey::from_base64(None, &b64).unwrap();
        assert!(key.key_id().starts_with("k-"));
        assert_eq!(key.key_id().len(), 18);
        assert_eq!(RecordKey::from_base64(Some("named"), &b64).unwrap().key_id(), "named");
        assert!(RecordKey::from_base64(None, &B64.encode([0u8; 8])).is_err());
        assert!(format!("{key:?}").contains("<private>"));
    }
}
