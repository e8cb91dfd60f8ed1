//! # Sealed Run
//!
//! The self-hashing artifact and its companion manifest.
//!
//! `hash = sha256(canonical(sealed_run with "hash" = "" and no "observation"))`.
//! The `observation` block carries the wall-clock time the run was written
//! and is structurally outside the hash, so re-sealing the same inputs under
//! the same logical clock reproduces the same `hash`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use seal_core::{sha256_digest, CanonicalBytes, Timestamp};

use crate::commitments::InputsCommitments;
use crate::decision::DecisionState;
use crate::envelope::AuthorityEnvelope;
use crate::error::RunError;
use crate::scope::HashScope;

pub const SEALED_SCHEMA_VERSION: &str = "1.0";

/// Top-level keys every sealed run carries.
pub const REQUIRED_KEYS: [&str; 8] = [
    "schema_version",
    "authority_envelope",
    "decision_state",
    "inputs_snapshot",
    "outputs",
    "artifacts_emitted",
    "replay_instructions",
    "hash",
];

pub const REPLAY_METHOD: &str = "seal replay";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputsSnapshot {
    pub files: Vec<FileHash>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs {
    pub top_risks: Vec<Value>,
    pub top_actions: Vec<Value>,
    pub suggested_updates: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayInstructions {
    pub method: String,
    pub command: String,
    pub required_files: Vec<String>,
}

/// Binding to the authority-ledger grant the run was sealed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityLedgerRef {
    pub ledger_path: String,
    pub entry_id: String,
    pub entry_hash: String,
    pub authority_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub observed_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedRun {
    pub schema_version: String,
    pub authority_envelope: AuthorityEnvelope,
    pub decision_state: DecisionState,
    pub inputs_snapshot: InputsSnapshot,
    pub outputs: Outputs,
    /// Files written for this run, relative to the output directory. Filled
    /// in after the first write.
    pub artifacts_emitted: Vec<FileHash>,
    pub replay_instructions: ReplayInstructions,
    pub hash_scope: HashScope,
    pub commit_hash: String,
    pub inputs_commitments: InputsCommitments,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_ledger_ref: Option<AuthorityLedgerRef>,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,
}

impl SealedRun {
    pub fn run_id(&self) -> &str {
        &self.authority_envelope.provenance.run_id
    }

    pub fn committed_at(&self) -> Timestamp {
        self.authority_envelope.provenance.created_at
    }

    /// Recompute and store the content hash.
    pub fn rehash(&mut self) -> Result<&str, RunError> {
        self.hash = compute_sealed_hash(&serde_json::to_value(&*self)?)?;
        Ok(&self.hash)
    }
}

/// Content hash of a raw sealed run: `hash` blanked, `observation` removed.
pub fn compute_sealed_hash(sealed: &Value) -> Result<String, RunError> {
    let mut copy = sealed.clone();
    if let Value::Object(map) = &mut copy {
        map.remove("observation");
    }
    let canonical = CanonicalBytes::with_blanked_field(&copy, "hash")?;
    Ok(sha256_digest(&canonical).to_string())
}

/// Human-audit companion written beside the sealed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealManifest {
    pub sealed_run: String,
    pub run_id: String,
    pub decision_id: String,
    pub commit_hash: String,
    pub hash_scope: HashScope,
    pub file_row_counts: BTreeMap<String, u64>,
    pub policy_version: String,
    pub schema_versions: BTreeMap<String, String>,
}
