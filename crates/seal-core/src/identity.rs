//! # Deterministic Identifiers
//!
//! Every identifier the toolkit mints is derived from a content digest, never
//! from randomness, so two runs over the same inputs name things identically.
//! The form is `PREFIX-<leading hex>`.

use serde::Serialize;

use crate::digest::{content_digest, ContentDigest};
use crate::error::CanonicalizationError;

/// The namespaces of deterministic identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Sealed run, derived from `commit_hash`.
    Run,
    /// Authority ledger entry.
    Authority,
    /// Transparency log entry.
    TransparencyEntry,
    /// Authority Boundary Primitive.
    Abp,
    /// Action contract.
    Action,
    /// Authority action ledger entry.
    ActionEntry,
}

impl IdKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Run => "RUN",
            Self::Authority => "AUTH",
            Self::TransparencyEntry => "TLE",
            Self::Abp => "ABP",
            Self::Action => "ACT",
            Self::ActionEntry => "AAE",
        }
    }

    /// Number of hex characters kept from the digest.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Action => 12,
            _ => 8,
        }
    }
}

/// `PREFIX-<first hex_len chars of the digest>`.
pub fn det_id(kind: IdKind, digest: &ContentDigest) -> String {
    let hex = digest.to_hex();
    format!("{}-{}", kind.prefix(), &hex[..kind.hex_len()])
}

/// Canonicalize `payload`, hash it, and derive an id of the given kind.
pub fn det_id_of(kind: IdKind, payload: &impl Serialize) -> Result<String, CanonicalizationError> {
    Ok(det_id(kind, &content_digest(payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::sha256_raw;
    use serde_json::json;

    #[test]
    fn run_id_uses_eight_hex_chars() {
        let d = sha256_raw(b"");
        assert_eq!(det_id(IdKind::Run, &d), "RUN-e3b0c442");
    }

    #[test]
    fn action_id_uses_twelve_hex_chars() {
        let d = sha256_raw(b"");
        assert_eq!(det_id(IdKind::Action, &d), "ACT-e3b0c44298fc");
    }

    #[test]
    fn ids_are_stable_across_key_order() {
        let a = det_id_of(IdKind::Authority, &json!({"actor_id": "alice", "authority_id": "GOV-1"}))
            .unwrap();
        let b = det_id_of(IdKind::Authority, &json!({"authority_id": "GOV-1", "actor_id": "alice"}))
            .unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("AUTH-"));
        assert_eq!(a.len(), "AUTH-".len() + 8);
    }

    #[test]
    fn different_payloads_give_different_ids() {
        let a = det_id_of(IdKind::Abp, &json!({"scope": "x"})).unwrap();
        let b = det_id_of(IdKind::Abp, &json!({"scope": "y"})).unwrap();
        assert_ne!(a, b);
    }
}
