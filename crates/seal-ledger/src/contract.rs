//! # Action Contracts
//!
//! A short-lived, HMAC-signed capability token that gates a privileged
//! operation such as key rotation or re-encryption.
//!
//! ```text
//! unsigned  = {action_type, requested_by, dri, approver, timestamp, ttl}
//! action_id = "ACT-" + sha256(canonical(unsigned))[..12]
//! signature = hex(HMAC-SHA256(key, canonical({action_id} ∪ unsigned)))
//! ```
//!
//! A contract is valid while `now ≤ timestamp + ttl`.

use serde::{Deserialize, Serialize};

use seal_core::{det_id_of, AuthorityReason, CanonicalBytes, IdKind, Timestamp};
use seal_crypto::HmacKey;

use crate::error::LedgerError;

pub const DEFAULT_CONTRACT_TTL_SECS: i64 = 900;

/// Upper bound on a contract's lifetime: 30 days.
pub const MAX_CONTRACT_TTL_SECS: i64 = 30 * 86_400;

fn check_ttl(ttl: i64) -> Result<(), LedgerError> {
    if ttl <= 0 || ttl > MAX_CONTRACT_TTL_SECS {
        return Err(LedgerError::InvalidEntry(format!(
            "ttl must be in 1..={MAX_CONTRACT_TTL_SECS} seconds, got {ttl}"
        )));
    }
    Ok(())
}

/// A signed action contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContract {
    pub action_id: String,
    pub action_type: String,
    pub requested_by: String,
    pub dri: String,
    pub approver: String,
    pub timestamp: Timestamp,
    pub ttl: i64,
    pub signature: String,
}

#[derive(Serialize)]
struct Unsigned<'a> {
    action_type: &'a str,
    requested_by: &'a str,
    dri: &'a str,
    approver: &'a str,
    timestamp: Timestamp,
    ttl: i64,
}

#[derive(Serialize)]
struct SignPayload<'a> {
    action_id: &'a str,
    #[serde(flatten)]
    unsigned: Unsigned<'a>,
}

/// Parameters of a contract to be issued.
#[derive(Debug, Clone)]
pub struct ContractRequest {
    pub action_type: String,
    pub requested_by: String,
    pub dri: String,
    pub approver: String,
    pub ttl: i64,
}

impl ContractRequest {
    pub fn new(
        action_type: impl Into<String>,
        requested_by: impl Into<String>,
        dri: impl Into<String>,
        approver: impl Into<String>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            requested_by: requested_by.into(),
            dri: dri.into(),
            approver: approver.into(),
            ttl: DEFAULT_CONTRACT_TTL_SECS,
        }
    }

    pub fn ttl(mut self, secs: i64) -> Self {
        self.ttl = secs;
        self
    }
}

impl ActionContract {
    fn unsigned(&self) -> Unsigned<'_> {
        Unsigned {
            action_type: &self.action_type,
            requested_by: &self.requested_by,
            dri: &self.dri,
            approver: &self.approver,
            timestamp: self.timestamp,
            ttl: self.ttl,
        }
    }

    fn signing_bytes(&self) -> Result<CanonicalBytes, LedgerError> {
        Ok(CanonicalBytes::new(&SignPayload {
            action_id: &self.action_id,
            unsigned: self.unsigned(),
        })?)
    }

    /// Issue and sign a contract at `now`.
    pub fn create(
        request: ContractRequest,
        key: &HmacKey,
        now: Timestamp,
    ) -> Result<Self, LedgerError> {
        check_ttl(request.ttl)?;
        for (field, value) in [
            ("action_type", &request.action_type),
            ("requested_by", &request.requested_by),
            ("dri", &request.dri),
            ("approver", &request.approver),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidEntry(format!("{field} is required")));
            }
        }

        let mut contract = Self {
            action_id: String::new(),
            action_type: request.action_type,
            requested_by: request.requested_by,
            dri: request.dri,
            approver: request.approver,
            timestamp: now,
            ttl: request.ttl,
            signature: String::new(),
        };
        contract.action_id = det_id_of(IdKind::Action, &contract.unsigned())?;
        contract.signature = key.sign_hex(&contract.signing_bytes()?);
        tracing::debug!(action_id = %contract.action_id, action_type = %contract.action_type, "action contract issued");
        Ok(contract)
    }

    pub fn expires_at(&self) -> Result<Timestamp, LedgerError> {
        Ok(self.timestamp.add_secs(self.ttl)?)
    }

    /// Validate type, TTL, id, signature and expiry, in that order.
    pub fn validate(
        &self,
        expected_action_type: &str,
        key: &HmacKey,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        if self.action_type != expected_action_type {
            return Err(LedgerError::authority(
                AuthorityReason::ContractTypeMismatch,
                format!(
                    "contract {} is {:?}, expected {expected_action_type:?}",
                    self.action_id, self.action_type
                ),
            ));
        }
        check_ttl(self.ttl)?;
        let expected_id = det_id_of(IdKind::Action, &self.unsigned())?;
        if expected_id != self.action_id {
            return Err(LedgerError::authority(
                AuthorityReason::ContractSignatureInvalid,
                format!("action_id {} does not match contract fields", self.action_id),
            ));
        }
        if !key.verify_hex(&self.signing_bytes()?, &self.signature) {
            return Err(LedgerError::authority(
                AuthorityReason::ContractSignatureInvalid,
                format!("invalid signature on {}", self.action_id),
            ));
        }
        let expires_at = self.expires_at()?;
        if now > expires_at {
            return Err(LedgerError::authority(
                AuthorityReason::ContractExpired,
                format!("{} expired at {expires_at}", self.action_id),
            ));
        }
        Ok(())
    }

    /// Parse a contract from JSON, requiring every field.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, LedgerError> {
        let missing: Vec<&str> = [
            "action_id", "action_type", "requested_by", "dri", "approver", "timestamp", "ttl",
            "signature",
        ]
        .into_iter()
        .filter(|k| value.get(k).is_none())
        .collect();
        if !missing.is_empty() {
            return Err(LedgerError::InvalidEntry(format!(
                "missing action contract fields: {}",
                missing.join(", ")
            )));
        }
        let contract: Self = serde_json::from_value(value.clone())
            .map_err(|e| LedgerError::InvalidEntry(format!("malformed action contract: {e}")))?;
        check_ttl(contract.ttl)?;
        Ok(contract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> HmacKey {
        HmacKey::from_bytes(b"authority-signing-key".to_vec()).unwrap()
    }

    fn t0() -> Timestamp {
        Timestamp::parse("2026-02-21T00:00:00Z").unwrap()
    }

    fn contract() -> ActionContract {
        ActionContract::create(
            ContractRequest::new("REENCRYPT", "ops-bot", "alice", "bob"),
            &key(),
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn create_is_deterministic() {
        let a = contract();
        let b = contract();
        assert_eq!(a, b);
        assert!(a.action_id.starts_with("ACT-"));
        assert_eq!(a.action_id.len(), 16);
        assert_eq!(a.signature.len(), 64);
        assert_eq!(a.ttl, DEFAULT_CONTRACT_TTL_SECS);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = ActionContract::create(
            ContractRequest::new("REENCRYPT", "ops", "alice", "bob").ttl(0),
            &key(),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry(_)));
    }

    #[test]
    fn oversized_ttl_is_rejected_everywhere() {
        let err = ActionContract::create(
            ContractRequest::new("REENCRYPT", "ops", "alice", "bob").ttl(i64::MAX),
            &key(),
            t0(),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry(_)));

        let mut forged = contract();
        forged.ttl = i64::MAX;
        assert!(matches!(
            forged.validate("REENCRYPT", &key(), t0()),
            Err(LedgerError::InvalidEntry(_))
        ));
        let mut v = serde_json::to_value(contract()).unwrap();
        v["ttl"] = serde_json::json!(i64::MAX);
        assert!(matches!(
            ActionContract::from_value(&v),
            Err(LedgerError::InvalidEntry(_))
        ));
    }

    #[test]
    fn longest_ttl_still_validates() {
        let c = ActionContract::create(
            ContractRequest::new("REENCRYPT", "ops", "alice", "bob").ttl(MAX_CONTRACT_TTL_SECS),
            &key(),
            t0(),
        )
        .unwrap();
        c.validate("REENCRYPT", &key(), c.expires_at().unwrap()).unwrap();
    }

    #[test]
    fn blank_role_is_rejected() {
        assert!(ActionContract::create(
            ContractRequest::new("REENCRYPT", "ops", "", "bob"),
            &key(),
            t0()
        )
        .is_err());
    }

    #[test]
    fn valid_within_ttl() {
        let c = contract();
        c.validate("REENCRYPT", &key(), t0().add_secs(900).unwrap()).unwrap();
    }

    #[test]
    fn expired_after_ttl() {
        let c = contract();
        match c.validate("REENCRYPT", &key(), t0().add_secs(901).unwrap()) {
            Err(LedgerError::Authority { reason, .. }) => {
                assert_eq!(reason, AuthorityReason::ContractExpired)
            }
            other => panic!("expected expiry, got {other:?}"),
        }
    }

    #[test]
    fn wrong_type_is_rejected() {
        match contract().validate("ROTATE_KEYS", &key(), t0()) {
            Err(LedgerError::Authority { reason, .. }) => {
                assert_eq!(reason, AuthorityReason::ContractTypeMismatch)
            }
            other => panic!("expected type mismatch, got {other:?}"),
        }
    }

    #[test]
    fn tampered_field_or_wrong_key_fails_signature() {
        let mut c = contract();
        c.approver = "mallory".into();
        assert!(matches!(
            c.validate("REENCRYPT", &key(), t0()),
            Err(LedgerError::Authority {
                reason: AuthorityReason::ContractSignatureInvalid,
                ..
            })
        ));
        let other = HmacKey::from_bytes(b"other".to_vec()).unwrap();
        assert!(contract().validate("REENCRYPT", &other, t0()).is_err());
    }

    #[test]
    fn from_value_lists_missing_fields() {
        let mut v = serde_json::to_value(contract()).unwrap();
        v.as_object_mut().unwrap().remove("dri");
        v.as_object_mut().unwrap().remove("ttl");
        match ActionContract::from_value(&v) {
            Err(LedgerError::InvalidEntry(msg)) => {
                assert!(msg.contains("dri") && msg.contains("ttl"), "{msg}")
            }
            other => panic!("expected missing fields, got {other:?}"),
        }
    }
}
