//! # Content Digest
//!
//! `ContentDigest` is the single fingerprint type of the workspace. It renders
//! and serializes as `sha256:<64 lowercase hex>`, the form stored in every
//! sealed run, ledger entry and signature envelope.
//!
//! ## Security Invariant
//!
//! Structured data is hashed only through [`sha256_digest`], which accepts
//! `&CanonicalBytes`. Raw byte hashing ([`sha256_raw`]) exists for on-disk
//! files, whose bytes are the artifact being attested and must not be
//! re-canonicalized.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::{CanonicalizationError, SealError};

/// The hash algorithm that produced a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestAlgorithm {
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content digest with its algorithm tag.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest {
    algorithm: DigestAlgorithm,
    bytes: [u8; 32],
}

impl ContentDigest {
    pub fn new(algorithm: DigestAlgorithm, bytes: [u8; 32]) -> Self {
        Self { algorithm, bytes }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// The raw 32 digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Lowercase hex without the algorithm prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse `sha256:<hex>`. Bare 64-char hex is rejected.
    pub fn parse(s: &str) -> Result<Self, SealError> {
        let hex_part = s.strip_prefix("sha256:").ok_or_else(|| {
            SealError::Serialization(format!("digest must start with \"sha256:\", got {s:?}"))
        })?;
        if hex_part.len() != 64 {
            return Err(SealError::Serialization(format!(
                "digest hex must be 64 chars, got {}",
                hex_part.len()
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|e| SealError::Serialization(format!("invalid digest hex: {e}")))?;
        Ok(Self::new(DigestAlgorithm::Sha256, bytes))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({self})")
    }
}

impl FromStr for ContentDigest {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 over canonical bytes.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    sha256_raw(data.as_bytes())
}

/// Canonicalize then hash. The common "hash of X" path.
pub fn content_digest(obj: &impl Serialize) -> Result<ContentDigest, CanonicalizationError> {
    Ok(sha256_digest(&CanonicalBytes::new(obj)?))
}

/// SHA-256 over raw bytes. Reserved for on-disk artifact bytes.
pub fn sha256_raw(bytes: &[u8]) -> ContentDigest {
    let hash = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hash);
    ContentDigest::new(DigestAlgorithm::Sha256, out)
}

/// Stream a file through SHA-256 in 8 KiB chunks.
pub fn sha256_file(path: &Path) -> Result<ContentDigest, SealError> {
    let mut file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SealError::NotFound(format!("file {}", path.display())),
        _ => SealError::Io(e),
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Ok(ContentDigest::new(DigestAlgorithm::Sha256, out))
}
