//! # Authority Envelope
//!
//! Who acted, under what authority and policy, over which scope. The five
//! refusal checks and five enforcement gates are evaluated when the envelope
//! is built and recorded with their outcomes.
//!
//! A failed refusal check sets `refusal_triggered` and names the first
//! failing check in `refusal_reason_code`. A failed gate is recorded as
//! `fail`; replay reports it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use seal_core::Timestamp;
use seal_ledger::{GrantType, ScopeBound};

pub const ENVELOPE_VERSION: &str = "1.0";
pub const SCHEMA_VERSION: &str = "1.0";

pub const REFUSAL_CHECKS: [&str; 5] = [
    "authority_present",
    "scope_bound_valid",
    "policy_not_expired",
    "evidence_threshold_met",
    "provenance_complete",
];

pub const ENFORCEMENT_GATES: [&str; 5] = [
    "authority_envelope_complete",
    "policy_hash_matches",
    "schema_version_valid",
    "inputs_hashed",
    "refusal_checks_recorded",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityType {
    Direct,
    Delegated,
    System,
    Inherited,
}

impl AuthorityType {
    pub const NAMES: [&'static str; 4] = ["direct", "delegated", "system", "inherited"];
}

impl From<GrantType> for AuthorityType {
    fn from(g: GrantType) -> Self {
        match g {
            GrantType::Delegated => Self::Delegated,
            _ => Self::Direct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityBlock {
    #[serde(rename = "type")]
    pub authority_type: AuthorityType,
    pub source: String,
    pub effective_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub policy_version: String,
    pub policy_hash: String,
    pub prompt_hashes: BTreeMap<String, String>,
    pub schema_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refusal {
    pub refusal_available: bool,
    pub refusal_triggered: bool,
    pub refusal_reason_code: Option<String>,
    pub checks_performed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateResult {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub gate: String,
    pub result: GateResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enforcement {
    pub gates_checked: Vec<String>,
    pub gate_outcomes: Vec<GateOutcome>,
    pub enforcement_emitted: bool,
}

impl Enforcement {
    pub fn failed_gates(&self) -> impl Iterator<Item = &str> {
        self.gate_outcomes
            .iter()
            .filter(|g| g.result == GateResult::Fail)
            .map(|g| g.gate.as_str())
    }
}

/// Run provenance. Wall-clock observation time is not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub created_at: Timestamp,
    pub run_id: String,
    pub deterministic_inputs_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityEnvelope {
    pub envelope_version: String,
    pub actor: Actor,
    pub authority: AuthorityBlock,
    pub scope_bound: ScopeBound,
    pub policy_snapshot: PolicySnapshot,
    pub refusal: Refusal,
    pub enforcement: Enforcement,
    pub provenance: Provenance,
}

/// Everything the envelope is built from.
#[derive(Debug, Clone)]
pub struct EnvelopeInputs {
    pub actor: Actor,
    pub authority: AuthorityBlock,
    pub scope_bound: ScopeBound,
    /// Decisions the bound ledger grant covers. `None` when no grant is bound.
    pub granted_scope: Option<ScopeBound>,
    pub policy_snapshot: PolicySnapshot,
    pub committed_at: Timestamp,
    pub run_id: String,
    pub commit_hash: String,
    pub input_hashes: Vec<String>,
}

fn refusal_outcomes(inputs: &EnvelopeInputs) -> Vec<(&'static str, bool)> {
    let decisions = &inputs.scope_bound.decisions;
    let scope_ok = !decisions.is_empty()
        && inputs.granted_scope.as_ref().map_or(true, |granted| {
            granted.decisions.is_empty() || decisions.iter().all(|d| granted.covers_decision(d))
        });
    vec![
        (
            "authority_present",
            !inputs.actor.id.is_empty() && !inputs.authority.source.is_empty(),
        ),
        ("scope_bound_valid", scope_ok),
        (
            "policy_not_expired",
            inputs
                .authority
                .expires_at
                .map_or(true, |exp| exp > inputs.committed_at),
        ),
        ("evidence_threshold_met", !inputs.input_hashes.is_empty()),
        (
            "provenance_complete",
            !inputs.run_id.is_empty() && !inputs.commit_hash.is_empty(),
        ),
    ]
}

fn gate_outcomes(inputs: &EnvelopeInputs, refusal_recorded: bool) -> Vec<(&'static str, bool)> {
    vec![
        (
            "authority_envelope_complete",
            !inputs.actor.id.is_empty()
                && !inputs.actor.role.is_empty()
                && !inputs.scope_bound.decisions.is_empty(),
        ),
        (
            "policy_hash_matches",
            inputs.policy_snapshot.policy_hash.starts_with("sha256:"),
        ),
        (
            "schema_version_valid",
            inputs.policy_snapshot.schema_version == SCHEMA_VERSION,
        ),
        (
            "inputs_hashed",
            !inputs.input_hashes.is_empty()
                && inputs.input_hashes.iter().all(|h| h.starts_with("sha256:")),
        ),
        ("refusal_checks_recorded", refusal_recorded),
    ]
}

impl AuthorityEnvelope {
    pub fn build(inputs: EnvelopeInputs) -> Self {
        let checks = refusal_outcomes(&inputs);
        let first_failed = checks.iter().find(|(_, ok)| !ok).map(|(name, _)| *name);
        if let Some(check) = first_failed {
            tracing::warn!(run_id = %inputs.run_id, check, "refusal check failed");
        }
        let refusal = Refusal {
            refusal_available: true,
            refusal_triggered: first_failed.is_some(),
            refusal_reason_code: first_failed.map(str::to_uppercase),
            checks_performed: checks.iter().map(|(n, _)| n.to_string()).collect(),
        };

        let gates = gate_outcomes(&inputs, refusal.checks_performed.len() == REFUSAL_CHECKS.len());
        let enforcement = Enforcement {
            gates_checked: gates.iter().map(|(g, _)| g.to_string()).collect(),
            gate_outcomes: gates
                .iter()
                .map(|(g, ok)| GateOutcome {
                    gate: g.to_string(),
                    result: if *ok { GateResult::Pass } else { GateResult::Fail },
                })
                .collect(),
            enforcement_emitted: true,
        };

        Self {
            envelope_version: ENVELOPE_VERSION.to_string(),
            actor: inputs.actor,
            authority: inputs.authority,
            scope_bound: inputs.scope_bound,
            policy_snapshot: inputs.policy_snapshot,
            refusal,
            enforcement,
            provenance: Provenance {
                created_at: inputs.committed_at,
                run_id: inputs.run_id,
                deterministic_inputs_hash: inputs.commit_hash,
            },
        }
    }
}
