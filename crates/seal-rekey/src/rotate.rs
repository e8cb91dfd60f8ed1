//! Authority gate for key rotation.
//!
//! A rotation runs only after its `REENCRYPT` action contract validates
//! and the signer's entry is accepted by the authority action ledger.
//! Completion is recorded as a second entry under the same contract.

use serde_json::json;

use seal_core::Timestamp;
use seal_crypto::HmacKey;
use seal_ledger::{ActionContract, ActionEntry, ActionLedger, ActionRequest, AuthorityTier};

use crate::checkpoint::JobStatus;
use crate::error::RekeyError;
use crate::job::{RekeyJob, RekeySummary, Rotation};

pub const REENCRYPT_ACTION: &str = "REENCRYPT";
pub const REENCRYPT_COMPLETED: &str = "REENCRYPT_COMPLETED";

/// Who is rotating, under which contract, recorded where.
#[derive(Debug)]
pub struct RotationAuthority<'a> {
    pub contract: &'a ActionContract,
    pub contract_key: &'a HmacKey,
    pub signer_id: &'a str,
    pub signer_tier: AuthorityTier,
    pub reason: &'a str,
    pub ledger: &'a ActionLedger,
}

#[derive(Debug)]
pub struct RotationOutcome {
    pub summary: RekeySummary,
    pub authorized: ActionEntry,
    /// Present once the job reaches `completed` in this invocation.
    pub completed: Option<ActionEntry>,
}

impl RotationAuthority<'_> {
    fn record(
        &self,
        action_type: &str,
        payload: serde_json::Value,
        now: Timestamp,
    ) -> Result<ActionEntry, RekeyError> {
        Ok(self.ledger.append(ActionRequest {
            action_type: action_type.to_string(),
            signer_id: self.signer_id.to_string(),
            signer_tier: self.signer_tier,
            reason: self.reason.to_string(),
            contract: self.contract.clone(),
            payload,
            recorded_at: now,
        })?)
    }

    /// Validate the contract and record the authorization.
    pub fn authorize(&self, job: &RekeyJob, now: Timestamp) -> Result<ActionEntry, RekeyError> {
        self.contract
            .validate(REENCRYPT_ACTION, self.contract_key, now)?;
        self.record(
            REENCRYPT_ACTION,
            json!({
                "tenant_id": job.tenant_id(),
                "idempotency_key": job.idempotency_key(),
                "checkpoint_path": job.checkpoint_path().display().to_string(),
            }),
            now,
        )
    }
}

/// Authorize, then run or resume `job`.
pub fn rotate(
    job: &RekeyJob,
    rotation: &Rotation,
    authority: &RotationAuthority<'_>,
    now: Timestamp,
) -> Result<RotationOutcome, RekeyError> {
    let authorized = authority.authorize(job, now)?;
    let summary = job.run(rotation)?;
    let completed = if summary.status == JobStatus::Completed {
        Some(authority.record(
            REENCRYPT_COMPLETED,
            json!({
                "tenant_id": summary.tenant_id,
                "idempotency_key": job.idempotency_key(),
                "files_rewritten": summary.files_rewritten,
                "records_reencrypted": summary.records_reencrypted,
                "previous_key_id": rotation.previous.key_id(),
                "current_key_id": rotation.current.key_id(),
            }),
            now,
        )?)
    } else {
        None
    };
    Ok(RotationOutcome {
        summary,
        authorized,
        completed,
    })
}
