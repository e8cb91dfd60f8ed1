//! # Error Types
//!
//! Construction-time failures are raised through [`SealError`] and abort the
//! operation before any artifact is produced. Verification findings are not
//! errors; they accumulate in a
//! [`VerificationReport`](crate::report::VerificationReport).
//!
//! ## Taxonomy
//!
//! - `Construction`: contradiction, missing authority field, invalid TTL.
//! - `Integrity`: recomputed hash differs from the stored one.
//! - `Authority`: revoked, expired, wrong tier, unmatched contract role.
//! - `Signature`: missing envelope, invalid signature, threshold not met.
//! - `NotFound`: missing file, ledger entry or log entry.
//!
//! `NotFound` is kept apart from `Integrity` because the operator response
//! differs: restore a missing file, investigate a mismatched one.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the sealing toolkit.
#[derive(Error, Debug)]
pub enum SealError {
    /// A document could not be built from the supplied inputs.
    #[error("construction error: {0}")]
    Construction(String),

    /// A recomputed hash, chain link or merkle root does not match.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// An authority grant or action contract does not permit the operation.
    #[error("authority error ({reason}): {detail}")]
    Authority {
        /// Machine-readable reason code.
        reason: AuthorityReason,
        /// Human-readable context.
        detail: String,
    },

    /// A signature is missing, invalid, or below threshold.
    #[error("signature error: {0}")]
    Signature(String),

    /// A referenced file or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SealError {
    /// Shorthand for an authority error.
    pub fn authority(reason: AuthorityReason, detail: impl Into<String>) -> Self {
        Self::Authority {
            reason,
            detail: detail.into(),
        }
    }

    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Construction(_) => ErrorKind::Construction,
            Self::Integrity(_) => ErrorKind::Integrity,
            Self::Authority { .. } => ErrorKind::Authority,
            Self::Signature(_) => ErrorKind::Signature,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Canonicalization(_) | Self::Serialization(_) => ErrorKind::Serialization,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<serde_json::Error> for SealError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Error class, for matching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Construction,
    Integrity,
    Authority,
    Signature,
    NotFound,
    Serialization,
    Io,
}

/// Reason codes attached to [`SealError::Authority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityReason {
    /// A revocation entry covers the grant.
    Revoked,
    /// The grant's `expires_at` has passed.
    Expired,
    /// The grant's `effective_at` is still in the future.
    NotYetEffective,
    /// The signer's tier is too low for the contract role it claims.
    PrecedenceTier,
    /// The signer is neither the contract's DRI nor its approver.
    RoleMismatch,
    /// The action contract's TTL has elapsed.
    ContractExpired,
    /// The action contract was issued for a different action type.
    ContractTypeMismatch,
    /// The action contract's HMAC does not verify.
    ContractSignatureInvalid,
}

impl AuthorityReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::NotYetEffective => "not_yet_effective",
            Self::PrecedenceTier => "precedence_tier",
            Self::RoleMismatch => "role_mismatch",
            Self::ContractExpired => "contract_expired",
            Self::ContractTypeMismatch => "contract_type_mismatch",
            Self::ContractSignatureInvalid => "contract_signature_invalid",
        }
    }
}

impl fmt::Display for AuthorityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Scores and percentages must travel as decimal strings.
    #[error("float values are not permitted in canonical representations; use a decimal string: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            SealError::Construction("x".into()).kind(),
            ErrorKind::Construction
        );
        assert_eq!(
            SealError::authority(AuthorityReason::Revoked, "AUTH-1").kind(),
            ErrorKind::Authority
        );
        assert_eq!(SealError::NotFound("f".into()).kind(), ErrorKind::NotFound);
        assert_ne!(ErrorKind::NotFound, ErrorKind::Integrity);
    }

    #[test]
    fn authority_display_includes_reason_code() {
        let e = SealError::authority(AuthorityReason::PrecedenceTier, "signer is SYSTEM");
        assert_eq!(
            e.to_string(),
            "authority error (precedence_tier): signer is SYSTEM"
        );
    }

    #[test]
    fn reason_serializes_snake_case() {
        let s = serde_json::to_string(&AuthorityReason::NotYetEffective).unwrap();
        assert_eq!(s, "\"not_yet_effective\"");
    }

    #[test]
    fn json_error_becomes_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: SealError = err.into();
        assert_eq!(e.kind(), ErrorKind::Serialization);
    }
}
