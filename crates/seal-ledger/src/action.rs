//! # Authority Action Ledger
//!
//! Hash-chained record of privileged operations (key rotation,
//! re-encryption). Each entry pairs a signed [`ActionContract`] with an
//! independently asserted signer tier; neither alone authorizes the action.
//!
//! ## Precedence
//!
//! `SYSTEM < APPROVER < DRI`. An entry is accepted only if:
//!
//! - the signer's tier is not `SYSTEM`;
//! - a signer named as the contract's `dri` holds tier `DRI`;
//! - a signer named as the contract's `approver` holds `APPROVER` or higher;
//! - a signer named as neither is rejected.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use seal_core::{det_id_of, AuthorityReason, IdKind, Timestamp, VerificationReport};

use crate::chain::{append_chained, verify_chain, Chained};
use crate::contract::ActionContract;
use crate::error::LedgerError;
use crate::store::NdjsonStore;

pub const ACTION_ENTRY_VERSION: &str = "1.0";

/// Signer precedence tier, ordered lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthorityTier {
    System,
    Approver,
    Dri,
}

impl AuthorityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Approver => "APPROVER",
            Self::Dri => "DRI",
        }
    }

    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s.to_ascii_uppercase().as_str() {
            "SYSTEM" => Ok(Self::System),
            "APPROVER" => Ok(Self::Approver),
            "DRI" => Ok(Self::Dri),
            other => Err(LedgerError::InvalidEntry(format!(
                "unknown authority tier {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for AuthorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check `signer_id` at `tier` against the roles named in `contract`.
pub fn check_precedence(
    signer_id: &str,
    tier: AuthorityTier,
    contract: &ActionContract,
) -> Result<(), LedgerError> {
    if tier == AuthorityTier::System {
        return Err(LedgerError::authority(
            AuthorityReason::PrecedenceTier,
            format!("{signer_id}: SYSTEM tier cannot sign authority actions"),
        ));
    }
    if signer_id == contract.dri {
        if tier != AuthorityTier::Dri {
            return Err(LedgerError::authority(
                AuthorityReason::PrecedenceTier,
                format!("{signer_id} is the contract DRI but signs as {tier}"),
            ));
        }
        return Ok(());
    }
    if signer_id == contract.approver {
        if tier < AuthorityTier::Approver {
            return Err(LedgerError::authority(
                AuthorityReason::PrecedenceTier,
                format!("{signer_id} is the contract approver but signs as {tier}"),
            ));
        }
        return Ok(());
    }
    Err(LedgerError::authority(
        AuthorityReason::RoleMismatch,
        format!(
            "{signer_id} is neither dri ({}) nor approver ({}) of {}",
            contract.dri, contract.approver, contract.action_id
        ),
    ))
}

/// Body of one action ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub entry_version: String,
    pub entry_id: String,
    pub action_type: String,
    pub signer_id: String,
    pub signer_tier: AuthorityTier,
    pub reason: String,
    pub action_contract_id: String,
    pub contract: ActionContract,
    #[serde(default)]
    pub payload: Value,
    pub recorded_at: Timestamp,
}

pub type ActionEntry = Chained<ActionRecord>;

/// One privileged action to record.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action_type: String,
    pub signer_id: String,
    pub signer_tier: AuthorityTier,
    pub reason: String,
    pub contract: ActionContract,
    pub payload: Value,
    pub recorded_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct ActionLedger {
    store: NdjsonStore,
}

impl ActionLedger {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            store: NdjsonStore::new(path.as_ref()),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Record an action after the precedence check. The contract is expected
    /// to have been validated by the caller.
    pub fn append(&self, request: ActionRequest) -> Result<ActionEntry, LedgerError> {
        if request.action_type.trim().is_empty() {
            return Err(LedgerError::InvalidEntry("action_type is required".into()));
        }
        if request.reason.trim().is_empty() {
            return Err(LedgerError::InvalidEntry("reason is required".into()));
        }
        check_precedence(&request.signer_id, request.signer_tier, &request.contract)?;

        let entry_id = det_id_of(
            IdKind::ActionEntry,
            &serde_json::json!({
                "action_contract_id": request.contract.action_id,
                "action_type": request.action_type,
                "signer_id": request.signer_id,
                "recorded_at": request.recorded_at,
            }),
        )?;
        let record = ActionRecord {
            entry_version: ACTION_ENTRY_VERSION.to_string(),
            entry_id,
            action_type: request.action_type,
            signer_id: request.signer_id,
            signer_tier: request.signer_tier,
            reason: request.reason,
            action_contract_id: request.contract.action_id.clone(),
            contract: request.contract,
            payload: request.payload,
            recorded_at: request.recorded_at,
        };
        let entry = append_chained(&self.store, Some(Timestamp::now()), |_| Ok(record))?;
        tracing::info!(
            entry_id = %entry.body.entry_id,
            action_type = %entry.body.action_type,
            signer = %entry.body.signer_id,
            "authority action recorded"
        );
        Ok(entry)
    }

    pub fn entries(&self) -> Result<Vec<ActionEntry>, LedgerError> {
        self.store.read_all()
    }

    pub fn verify(&self) -> VerificationReport {
        verify_chain(&self.store)
    }
}
