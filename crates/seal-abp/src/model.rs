//! ABP document types.
//!
//! List entries keep any extra attributes they were written with, so a
//! document read from disk re-serializes to the same canonical bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use seal_core::Timestamp;

pub const ABP_VERSION: &str = "1.0";
pub const ABP_FILE: &str = "abp_v1.json";

/// Proof artifacts required when no `proof` section is given.
pub const DEFAULT_PROOF: [&str; 5] = [
    "seal",
    "manifest",
    "pack_hash",
    "transparency_log",
    "authority_ledger",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbpScope {
    pub contract_id: String,
    pub program: String,
    #[serde(default)]
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityRef {
    pub authority_entry_id: String,
    pub authority_entry_hash: String,
    #[serde(default)]
    pub authority_ledger_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl Objective {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attrs: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl Tool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Objectives {
    #[serde(default)]
    pub allowed: Vec<Objective>,
    #[serde(default)]
    pub denied: Vec<Objective>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tools {
    #[serde(default)]
    pub allow: Vec<Tool>,
    #[serde(default)]
    pub deny: Vec<Tool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSection {
    #[serde(default)]
    pub permissions: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Approvals {
    #[serde(default)]
    pub required: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    #[serde(default)]
    pub paths: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Runtime {
    #[serde(default)]
    pub validators: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for Proof {
    fn default() -> Self {
        Self {
            required: DEFAULT_PROOF.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    pub abp_id: String,
    pub abp_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    pub parent_abp_id: Option<String>,
    pub parent_abp_hash: Option<String>,
    #[serde(default)]
    pub children: Vec<ChildRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSeverity {
    Warn,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationTrigger {
    pub id: String,
    pub severity: TriggerSeverity,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPolicy {
    pub approver_role: String,
    pub threshold: u32,
    pub timeout_ms: Option<u64>,
    pub output: String,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            approver_role: "Reviewer".into(),
            threshold: 1,
            timeout_ms: Some(604_800_000),
            output: "abp_patch".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationReview {
    #[serde(default)]
    pub triggers: Vec<DelegationTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_policy: Option<ReviewPolicy>,
}

/// An Authority Boundary Primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Abp {
    pub abp_version: String,
    pub abp_id: String,
    pub scope: AbpScope,
    pub authority_ref: AuthorityRef,
    pub objectives: Objectives,
    pub tools: Tools,
    pub data: DataSection,
    pub approvals: Approvals,
    pub escalation: Escalation,
    pub runtime: Runtime,
    pub proof: Proof,
    pub composition: Composition,
    pub effective_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_review: Option<DelegationReview>,
    pub hash: String,
}
