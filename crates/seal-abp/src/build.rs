//! # Building an ABP
//!
//! ```text
//! abp_id = "ABP-" + sha256(canonical({scope, authority_ref, created_at}))[..8]
//! hash   = sha256(canonical(abp with hash = ""))
//! ```
//!
//! Allow/deny contradictions are checked first. A contradictory document
//! never gets an id or a hash.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use seal_core::{det_id_of, sha256_digest, CanonicalBytes, IdKind, Timestamp};
use seal_ledger::AuthorityLedger;

use crate::error::AbpError;
use crate::model::*;

/// Identifiers present in both lists of a section.
pub(crate) fn overlap<'a>(
    allow: impl IntoIterator<Item = &'a str>,
    deny: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let allow: BTreeSet<&str> = allow.into_iter().collect();
    deny.into_iter()
        .filter(|id| allow.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn check_contradictions(objectives: &Objectives, tools: &Tools) -> Result<(), AbpError> {
    let objectives = overlap(
        objectives.allowed.iter().map(|o| o.id.as_str()),
        objectives.denied.iter().map(|o| o.id.as_str()),
    );
    let tools = overlap(
        tools.allow.iter().map(|t| t.name.as_str()),
        tools.deny.iter().map(|t| t.name.as_str()),
    );
    if objectives.is_empty() && tools.is_empty() {
        Ok(())
    } else {
        Err(AbpError::Contradiction { objectives, tools })
    }
}

pub fn compute_abp_id(
    scope: &AbpScope,
    authority_ref: &AuthorityRef,
    created_at: Timestamp,
) -> Result<String, AbpError> {
    Ok(det_id_of(
        IdKind::Abp,
        &json!({
            "scope": scope,
            "authority_ref": authority_ref,
            "created_at": created_at,
        }),
    )?)
}

/// Content hash of a raw ABP document.
pub fn compute_abp_hash(abp: &Value) -> Result<String, AbpError> {
    Ok(sha256_digest(&CanonicalBytes::with_blanked_field(abp, "hash")?).to_string())
}

/// Builder for a single ABP. Every section defaults to empty, `proof` to
/// [`DEFAULT_PROOF`], and `effective_at` to the clock. A delegation review
/// without a policy gets [`ReviewPolicy::default`].
#[derive(Debug, Clone)]
pub struct AbpBuilder {
    scope: AbpScope,
    authority_ref: AuthorityRef,
    clock: Timestamp,
    objectives: Objectives,
    tools: Tools,
    data: DataSection,
    approvals: Approvals,
    escalation: Escalation,
    runtime: Runtime,
    proof: Proof,
    delegation_review: Option<DelegationReview>,
    effective_at: Option<Timestamp>,
    expires_at: Option<Timestamp>,
    composition: Composition,
}

impl AbpBuilder {
    pub fn new(scope: AbpScope, authority_ref: AuthorityRef, clock: Timestamp) -> Self {
        Self {
            scope,
            authority_ref,
            clock,
            objectives: Objectives::default(),
            tools: Tools::default(),
            data: DataSection::default(),
            approvals: Approvals::default(),
            escalation: Escalation::default(),
            runtime: Runtime::default(),
            proof: Proof::default(),
            delegation_review: None,
            effective_at: None,
            expires_at: None,
            composition: Composition::default(),
        }
    }

    /// Apply the optional sections of an ABP config document.
    pub fn sections(mut self, config: &AbpSections) -> Self {
        if let Some(v) = &config.objectives {
            self.objectives = v.clone();
        }
        if let Some(v) = &config.tools {
            self.tools = v.clone();
        }
        if let Some(v) = &config.data {
            self.data = v.clone();
        }
        if let Some(v) = &config.approvals {
            self.approvals = v.clone();
        }
        if let Some(v) = &config.escalation {
            self.escalation = v.clone();
        }
        if let Some(v) = &config.runtime {
            self.runtime = v.clone();
        }
        if let Some(v) = &config.proof {
            self.proof = v.clone();
        }
        if config.delegation_review.is_some() {
            self.delegation_review = config.delegation_review.clone();
        }
        self
    }

    pub fn objectives(mut self, objectives: Objectives) -> Self {
        self.objectives = objectives;
        self
    }

    pub fn tools(mut self, tools: Tools) -> Self {
        self.tools = tools;
        self
    }

    pub fn data(mut self, data: DataSection) -> Self {
        self.data = data;
        self
    }

    pub fn approvals(mut self, approvals: Approvals) -> Self {
        self.approvals = approvals;
        self
    }

    pub fn escalation(mut self, escalation: Escalation) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn proof(mut self, proof: Proof) -> Self {
        self.proof = proof;
        self
    }

    pub fn delegation_review(mut self, review: Option<DelegationReview>) -> Self {
        self.delegation_review = review;
        self
    }

    pub fn effective_at(mut self, at: Timestamp) -> Self {
        self.effective_at = Some(at);
        self
    }

    pub fn expires_at(mut self, at: Option<Timestamp>) -> Self {
        self.expires_at = at;
        self
    }

    pub fn parent(mut self, abp_id: impl Into<String>, abp_hash: impl Into<String>) -> Self {
        self.composition.parent_abp_id = Some(abp_id.into());
        self.composition.parent_abp_hash = Some(abp_hash.into());
        self
    }

    pub(crate) fn children(mut self, children: Vec<ChildRef>) -> Self {
        self.composition.children = children;
        self
    }

    pub fn build(self) -> Result<Abp, AbpError> {
        check_contradictions(&self.objectives, &self.tools)?;
        if self.authority_ref.authority_entry_id.trim().is_empty() {
            return Err(AbpError::Invalid(
                "authority_ref.authority_entry_id is required".into(),
            ));
        }
        let effective_at = self.effective_at.unwrap_or(self.clock);
        if let Some(exp) = self.expires_at {
            if exp <= effective_at {
                return Err(AbpError::Invalid(format!(
                    "expires_at {exp} must be after effective_at {effective_at}"
                )));
            }
        }

        let delegation_review = self.delegation_review.map(|mut review| {
            review.review_policy.get_or_insert_with(ReviewPolicy::default);
            review
        });

        let abp_id = compute_abp_id(&self.scope, &self.authority_ref, self.clock)?;
        let mut abp = Abp {
            abp_version: ABP_VERSION.to_string(),
            abp_id,
            scope: self.scope,
            authority_ref: self.authority_ref,
            objectives: self.objectives,
            tools: self.tools,
            data: self.data,
            approvals: self.approvals,
            escalation: self.escalation,
            runtime: self.runtime,
            proof: self.proof,
            composition: self.composition,
            effective_at,
            expires_at: self.expires_at,
            created_at: self.clock,
            delegation_review,
            hash: String::new(),
        };
        abp.hash = compute_abp_hash(&serde_json::to_value(&abp)?)?;
        tracing::debug!(abp_id = %abp.abp_id, hash = %abp.hash, "ABP built");
        Ok(abp)
    }
}

/// Optional ABP sections, as read from a config document.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AbpSections {
    pub objectives: Option<Objectives>,
    pub tools: Option<Tools>,
    pub data: Option<DataSection>,
    pub approvals: Option<Approvals>,
    pub escalation: Option<Escalation>,
    pub runtime: Option<Runtime>,
    pub proof: Option<Proof>,
    pub delegation_review: Option<DelegationReview>,
}

/// Build an [`AuthorityRef`] from a ledger entry.
pub fn resolve_authority_ref(
    entry_id: &str,
    ledger: &AuthorityLedger,
) -> Result<AuthorityRef, AbpError> {
    let entry = ledger
        .find_entry(entry_id)?
        .ok_or_else(|| AbpError::AuthorityNotFound {
            entry_id: entry_id.to_string(),
            ledger: ledger.path().display().to_string(),
        })?;
    Ok(AuthorityRef {
        authority_entry_id: entry_id.to_string(),
        authority_entry_hash: entry.entry_hash,
        authority_ledger_path: Some(ledger.path().display().to_string()),
    })
}

/// Write `abp_v1.json` into `out_dir`.
pub fn write_abp(abp: &Abp, out_dir: &Path) -> Result<PathBuf, AbpError> {
    let path = out_dir.join(ABP_FILE);
    seal_core::fsio::write_json_atomic(&path, abp)?;
    tracing::info!(abp_id = %abp.abp_id, path = %path.display(), "ABP written");
    Ok(path)
}

pub fn load_abp(path: &Path) -> Result<Abp, AbpError> {
    Ok(seal_core::fsio::read_json(path)?)
}
