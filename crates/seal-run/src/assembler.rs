//! # Sealed Run Assembler
//!
//! [`Assembler::prepare`] computes everything hashed (scope, commit hash,
//! run id, envelope, commitments, content hash) without touching the output
//! directory, so a missing input or unusable grant aborts before any file
//! exists.
//!
//! [`Assembler::write`] stages both files in `out_dir/.staging-<run_id>/`,
//! hashes the written bytes into `artifacts_emitted`, re-hashes, rewrites the
//! sealed file and only then renames the pair into `out_dir`. A sealed file
//! with a stale hash is never visible under its final name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use seal_core::fsio::write_json_atomic;
use seal_core::{det_id, sha256_file, sha256_raw, IdKind, Timestamp};
use seal_ledger::{AuthorityLedger, ScopeBound};

use crate::commitments::InputsCommitments;
use crate::config::SealConfig;
use crate::decision::{count_csv_rows, find_decision};
use crate::envelope::{
    Actor, AuthorityBlock, AuthorityEnvelope, AuthorityType, EnvelopeInputs, PolicySnapshot,
    SCHEMA_VERSION,
};
use crate::error::RunError;
use crate::scope::{HashScope, SCOPE_VERSION};
use crate::sealed::{
    AuthorityLedgerRef, FileHash, InputsSnapshot, Observation, Outputs, ReplayInstructions,
    SealManifest, SealedRun, REPLAY_METHOD, SEALED_SCHEMA_VERSION,
};

/// A ledger grant to seal under.
#[derive(Debug, Clone, Copy)]
pub struct AuthorityBinding<'a> {
    pub ledger: &'a AuthorityLedger,
    pub entry_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct SealRequest<'a> {
    pub decision_id: String,
    /// Logical clock. `None` seals against the wall clock and is not
    /// reproducible.
    pub clock: Option<Timestamp>,
    pub deterministic: bool,
    pub authority: Option<AuthorityBinding<'a>>,
    /// Wall-clock time recorded in the unhashed observation block.
    pub observed_at: Option<Timestamp>,
}

impl<'a> SealRequest<'a> {
    pub fn new(decision_id: impl Into<String>) -> Self {
        Self {
            decision_id: decision_id.into(),
            clock: None,
            deterministic: true,
            authority: None,
            observed_at: None,
        }
    }

    pub fn clock(mut self, clock: Timestamp) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn authority(mut self, ledger: &'a AuthorityLedger, entry_id: &'a str) -> Self {
        self.authority = Some(AuthorityBinding { ledger, entry_id });
        self
    }

    pub fn observed_at(mut self, at: Timestamp) -> Self {
        self.observed_at = Some(at);
        self
    }
}

/// A fully hashed sealed run that has not been written.
#[derive(Debug, Clone)]
pub struct PreparedSeal {
    pub sealed: SealedRun,
    pub manifest: SealManifest,
    pub file_stem: String,
}

impl PreparedSeal {
    pub fn sealed_file_name(&self) -> String {
        format!("{}.json", self.file_stem)
    }

    pub fn manifest_file_name(&self) -> String {
        format!("{}.manifest.json", self.file_stem)
    }
}

#[derive(Debug, Clone)]
pub struct SealOutcome {
    pub sealed: SealedRun,
    pub sealed_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Envelope fields that come from the authority source.
struct Authorization {
    actor: Actor,
    authority: AuthorityBlock,
    granted_scope: Option<ScopeBound>,
    ledger_ref: Option<AuthorityLedgerRef>,
}

pub struct Assembler<'a> {
    config: &'a SealConfig,
}

impl<'a> Assembler<'a> {
    pub fn new(config: &'a SealConfig) -> Self {
        Self { config }
    }

    fn authorize(
        &self,
        binding: Option<AuthorityBinding<'_>>,
        policy_version: &str,
        committed_at: Timestamp,
    ) -> Result<Authorization, RunError> {
        let Some(binding) = binding else {
            return Ok(Authorization {
                actor: Actor {
                    id: self.config.operator.clone(),
                    role: self.config.operator_role.clone(),
                },
                authority: AuthorityBlock {
                    authority_type: AuthorityType::Direct,
                    source: policy_version.to_string(),
                    effective_at: committed_at,
                    expires_at: None,
                },
                granted_scope: None,
                ledger_ref: None,
            });
        };

        let entry = binding
            .ledger
            .find_entry(binding.entry_id)?
            .ok_or_else(|| {
                RunError::MissingInput(format!(
                    "authority entry {} in {}",
                    binding.entry_id,
                    binding.ledger.path().display()
                ))
            })?;
        binding
            .ledger
            .require_active(&entry.body.authority_id, committed_at)?;
        let grant = entry.body;
        Ok(Authorization {
            actor: Actor {
                id: grant.actor_id.clone(),
                role: grant.actor_role.clone(),
            },
            authority: AuthorityBlock {
                authority_type: grant.grant_type.into(),
                source: grant.authority_id.clone(),
                effective_at: grant.effective_at,
                expires_at: grant.expires_at,
            },
            granted_scope: Some(grant.scope_bound.clone()),
            ledger_ref: Some(AuthorityLedgerRef {
                ledger_path: self.config.display_path(binding.ledger.path()),
                entry_id: grant.entry_id.clone(),
                entry_hash: entry.entry_hash,
                authority_id: grant.authority_id,
            }),
        })
    }

    /// Hash scope, commit hash, envelope and content hash. Writes nothing.
    pub fn prepare(&self, request: &SealRequest<'_>) -> Result<PreparedSeal, RunError> {
        let config = self.config;
        let policy_version = config.policy_version();
        let committed_at = request.clock.unwrap_or_else(Timestamp::now);

        let scope = HashScope::collect(config, &policy_version, request.clock, request.deterministic)?;
        let decision = find_decision(&config.decision_log(), &request.decision_id)?;
        let commit = scope.commit_hash()?;
        let commit_hash = commit.to_string();
        let run_id = det_id(IdKind::Run, &commit);
        let commitments = InputsCommitments::from_scope(&scope)?;

        let policy_hash = scope
            .policies
            .first()
            .map(|p| p.sha256.clone())
            .unwrap_or_else(|| sha256_raw(policy_version.as_bytes()).to_string());
        let auth = self.authorize(request.authority, &policy_version, committed_at)?;

        let envelope = AuthorityEnvelope::build(EnvelopeInputs {
            actor: auth.actor,
            authority: auth.authority,
            scope_bound: ScopeBound {
                decisions: vec![decision.decision_id.clone()],
                prompts: scope.prompts.iter().map(|f| f.path.clone()).collect(),
                datasets: scope.inputs.iter().map(|f| f.path.clone()).collect(),
                ..ScopeBound::default()
            },
            granted_scope: auth.granted_scope,
            policy_snapshot: PolicySnapshot {
                policy_version: policy_version.clone(),
                policy_hash,
                prompt_hashes: scope
                    .prompts
                    .iter()
                    .map(|f| (f.path.clone(), f.sha256.clone()))
                    .collect(),
                schema_version: SCHEMA_VERSION.to_string(),
            },
            committed_at,
            run_id: run_id.clone(),
            commit_hash: commit_hash.clone(),
            input_hashes: scope.inputs.iter().map(|f| f.sha256.clone()).collect(),
        });

        let file_stem = format!("{run_id}_{}", committed_at.to_compact());
        let out_rel = config.display_path(&config.out_dir());
        let mut sealed = SealedRun {
            schema_version: SEALED_SCHEMA_VERSION.to_string(),
            authority_envelope: envelope,
            decision_state: decision,
            inputs_snapshot: InputsSnapshot {
                files: scope
                    .inputs
                    .iter()
                    .map(|f| FileHash {
                        path: f.path.clone(),
                        sha256: f.sha256.clone(),
                    })
                    .collect(),
            },
            outputs: Outputs::default(),
            artifacts_emitted: Vec::new(),
            replay_instructions: ReplayInstructions {
                method: REPLAY_METHOD.to_string(),
                command: format!("{REPLAY_METHOD} {out_rel}/{file_stem}.json"),
                required_files: scope.all_files().map(|f| f.path.clone()).collect(),
            },
            hash_scope: scope.clone(),
            commit_hash: commit_hash.clone(),
            inputs_commitments: commitments,
            authority_ledger_ref: auth.ledger_ref,
            hash: String::new(),
            observation: None,
        };
        sealed.rehash()?;

        let manifest = SealManifest {
            sealed_run: format!("{file_stem}.json"),
            run_id: run_id.clone(),
            decision_id: request.decision_id.clone(),
            commit_hash,
            file_row_counts: scope
                .inputs
                .iter()
                .map(|f| (f.path.clone(), count_csv_rows(&config.resolve(Path::new(&f.path)))))
                .collect(),
            hash_scope: scope,
            policy_version,
            schema_versions: BTreeMap::from([
                ("sealed_run".to_string(), SEALED_SCHEMA_VERSION.to_string()),
                ("authority_envelope".to_string(), SCHEMA_VERSION.to_string()),
                ("hash_scope".to_string(), SCOPE_VERSION.to_string()),
                ("manifest".to_string(), "1.0".to_string()),
            ]),
        };

        tracing::debug!(%run_id, hash = %sealed.hash, "sealed run prepared");
        Ok(PreparedSeal {
            sealed,
            manifest,
            file_stem,
        })
    }

    /// Two-pass staged write into `out_dir`.
    pub fn write(
        &self,
        prepared: PreparedSeal,
        observed_at: Timestamp,
    ) -> Result<SealOutcome, RunError> {
        let out_dir = self.config.out_dir();
        fs::create_dir_all(&out_dir)?;
        let staging = out_dir.join(format!(".staging-{}", prepared.sealed.run_id()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let result = Self::write_staged(prepared, observed_at, &staging, &out_dir);
        if let Err(e) = fs::remove_dir_all(&staging) {
            tracing::warn!(staging = %staging.display(), error = %e, "staging directory not removed");
        }
        result
    }

    fn write_staged(
        prepared: PreparedSeal,
        observed_at: Timestamp,
        staging: &Path,
        out_dir: &Path,
    ) -> Result<SealOutcome, RunError> {
        let sealed_name = prepared.sealed_file_name();
        let manifest_name = prepared.manifest_file_name();
        let staged_sealed = staging.join(&sealed_name);
        let staged_manifest = staging.join(&manifest_name);
        let mut sealed = prepared.sealed;

        write_json_atomic(&staged_sealed, &sealed)?;
        write_json_atomic(&staged_manifest, &prepared.manifest)?;

        sealed.artifacts_emitted = vec![
            FileHash {
                path: sealed_name.clone(),
                sha256: sha256_file(&staged_sealed)?.to_string(),
            },
            FileHash {
                path: manifest_name.clone(),
                sha256: sha256_file(&staged_manifest)?.to_string(),
            },
        ];
        sealed.rehash()?;
        sealed.observation = Some(Observation { observed_at });
        write_json_atomic(&staged_sealed, &sealed)?;

        let sealed_path = out_dir.join(&sealed_name);
        let manifest_path = out_dir.join(&manifest_name);
        fs::rename(&staged_sealed, &sealed_path)?;
        if let Err(e) = fs::rename(&staged_manifest, &manifest_path) {
            if let Err(cleanup) = fs::remove_file(&sealed_path) {
                tracing::warn!(
                    path = %sealed_path.display(),
                    error = %cleanup,
                    "sealed run without manifest not removed"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            run_id = %sealed.run_id(),
            commit_hash = %sealed.commit_hash,
            hash = %sealed.hash,
            path = %sealed_path.display(),
            "sealed run written"
        );
        Ok(SealOutcome {
            sealed,
            sealed_path,
            manifest_path,
        })
    }

    pub fn seal(&self, request: &SealRequest<'_>) -> Result<SealOutcome, RunError> {
        let prepared = self.prepare(request)?;
        self.write(prepared, request.observed_at.unwrap_or_else(Timestamp::now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealed::compute_sealed_hash;
    use crate::testutil::{clock, fixture};
    use seal_ledger::{GrantRequest, GrantType};

    #[test]
    fn seal_writes_self_consistent_pair() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        assert!(out.sealed_path.exists());
        assert!(out.manifest_path.exists());
        assert_eq!(out.sealed.artifacts_emitted.len(), 2);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out.sealed_path).unwrap()).unwrap();
        assert_eq!(compute_sealed_hash(&raw).unwrap(), raw["hash"].as_str().unwrap());
        assert!(raw["observation"]["observed_at"].is_string());
        assert_eq!(
            out.sealed_path.file_name().unwrap().to_str().unwrap(),
            format!("{}_20260221T000000Z.json", out.sealed.run_id())
        );
        let staged: Vec<_> = fs::read_dir(cfg.out_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging"))
            .collect();
        assert!(staged.is_empty());
    }

    #[test]
    fn failed_manifest_move_leaves_no_sealed_run() {
        let (_d, cfg) = fixture();
        let assembler = Assembler::new(&cfg);
        let prepared = assembler
            .prepare(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let sealed_path = cfg.out_dir().join(prepared.sealed_file_name());
        let blocker = cfg.out_dir().join(prepared.manifest_file_name());
        fs::create_dir_all(blocker.join("occupied")).unwrap();

        assert!(assembler.write(prepared, clock()).is_err());
        assert!(!sealed_path.exists());
    }

    #[test]
    fn run_id_derives_from_commit_hash() {
        let (_d, cfg) = fixture();
        let prepared = Assembler::new(&cfg)
            .prepare(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let commit = seal_core::ContentDigest::parse(&prepared.sealed.commit_hash).unwrap();
        assert_eq!(prepared.sealed.run_id(), det_id(IdKind::Run, &commit));
        assert_eq!(prepared.manifest.file_row_counts["artifacts/sample_data/decision_log.csv"], 2);
    }

    #[test]
    fn unknown_decision_writes_nothing() {
        let (_d, cfg) = fixture();
        let err = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-404").clock(clock()))
            .unwrap_err();
        assert!(matches!(err, RunError::DecisionNotFound { .. }));
        assert!(!cfg.out_dir().exists());
    }

    #[test]
    fn revoked_grant_refuses_to_seal() {
        let (_d, cfg) = fixture();
        let ledger = AuthorityLedger::open(cfg.authority_ledger());
        let entry = ledger
            .append(
                GrantRequest::new("AUTH-001", "alice", "DRI", clock().add_secs(-3600).unwrap())
                    .grant_type(GrantType::Direct),
            )
            .unwrap();
        ledger
            .revoke("AUTH-001", "rotated", clock().add_secs(-60).unwrap())
            .unwrap();
        let err = Assembler::new(&cfg)
            .prepare(&SealRequest::new("DEC-001").clock(clock()).authority(&ledger, &entry.body.entry_id))
            .unwrap_err();
        assert!(matches!(err, RunError::Ledger(_)));
    }

    #[test]
    fn bound_grant_sets_actor_and_ref() {
        let (_d, cfg) = fixture();
        let ledger = AuthorityLedger::open(cfg.authority_ledger());
        let entry = ledger
            .append(GrantRequest::new("AUTH-001", "alice", "DRI", clock().add_secs(-3600).unwrap()))
            .unwrap();
        let prepared = Assembler::new(&cfg)
            .prepare(&SealRequest::new("DEC-001").clock(clock()).authority(&ledger, &entry.body.entry_id))
            .unwrap();
        let env = &prepared.sealed.authority_envelope;
        assert_eq!(env.actor.id, "alice");
        assert_eq!(env.authority.source, "AUTH-001");
        let r = prepared.sealed.authority_ledger_ref.as_ref().unwrap();
        assert_eq!(r.entry_hash, entry.entry_hash);
        assert_eq!(r.ledger_path, "artifacts/authority_ledger/ledger.ndjson");
    }
}
