//! # Seal-and-Prove Pipeline
//!
//! One decision, end to end:
//!
//! 1. locate the decision row
//! 2. auto-append an authority grant (optional)
//! 3. load or build an ABP (optional)
//! 4. seal and write the run
//! 5. sign the sealed file and the manifest, then append witness signatures
//! 6. append to the transparency log
//! 7. strict determinism self-audit
//! 8. self-replay with every optional check enabled
//! 9. assemble an evidence pack (optional)
//!
//! Steps 1 and 4 are fatal. Every other failure is recorded in
//! [`PipelineSummary::errors`] and the pipeline carries on, so the artifacts
//! that were written are always reported.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use seal_abp::{load_abp, resolve_authority_ref, write_abp, AbpBuilder, AbpScope, AbpSections};
use seal_core::Timestamp;
use seal_crypto::{append_signature, sign_artifact, ArtifactSigner, KeyRing, SignerIdentity};
use seal_ledger::{
    AuthorityLedger, AuthorityStatus, GrantRequest, LogAppend, ScopeBound, TransparencyLog,
};

use crate::assembler::{Assembler, SealOutcome, SealRequest};
use crate::audit::audit_file;
use crate::config::SealConfig;
use crate::decision::{find_decision, DecisionState};
use crate::error::RunError;
use crate::pack::{assemble_pack, PackContents};
use crate::replay::{replay_file, ReplayOptions, SignatureCheck};

/// An additional signer appended to the sealed run's envelope.
#[derive(Debug)]
pub struct Witness {
    pub signer: Box<dyn ArtifactSigner>,
    pub identity: SignerIdentity,
}

/// ABP config document: an optional scope plus any ABP sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AbpConfig {
    pub scope: Option<AbpScope>,
    #[serde(flatten)]
    pub sections: AbpSections,
}

impl AbpConfig {
    /// Read a JSON or YAML config.
    pub fn from_file(path: &Path) -> Result<Self, RunError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RunError::Config(format!("{}: {e}", path.display())))?;
        serde_yaml::from_str(&text).map_err(|e| RunError::Config(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Default)]
pub enum AbpSource {
    #[default]
    None,
    /// Use an existing ABP file.
    Load(PathBuf),
    /// Build one under the run's authority grant.
    Build(AbpConfig),
}

#[derive(Debug)]
pub struct PipelineOptions {
    pub decision_id: String,
    pub clock: Timestamp,
    pub signer: Box<dyn ArtifactSigner>,
    pub identity: SignerIdentity,
    pub witnesses: Vec<Witness>,
    /// Keys for the self-replay signature check.
    pub verify_keys: KeyRing,
    pub authority_entry_id: Option<String>,
    pub auto_authority: bool,
    pub abp: AbpSource,
    pub transparency: bool,
    pub audit: bool,
    pub replay_check: bool,
    pub pack_dir: Option<PathBuf>,
}

impl PipelineOptions {
    pub fn new(
        decision_id: impl Into<String>,
        clock: Timestamp,
        signer: Box<dyn ArtifactSigner>,
        verify_keys: KeyRing,
    ) -> Self {
        Self {
            decision_id: decision_id.into(),
            clock,
            signer,
            identity: SignerIdentity::default(),
            witnesses: Vec::new(),
            verify_keys,
            authority_entry_id: None,
            auto_authority: false,
            abp: AbpSource::None,
            transparency: true,
            audit: true,
            replay_check: true,
            pack_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub decision_id: String,
    pub run_id: String,
    pub commit_hash: String,
    pub content_hash: String,
    pub sealed_path: PathBuf,
    pub manifest_path: PathBuf,
    pub sig_paths: Vec<PathBuf>,
    pub transparency_entry: Option<String>,
    pub authority_entry_id: Option<String>,
    pub abp_path: Option<PathBuf>,
    pub audit_clean: Option<bool>,
    pub replay_passed: Option<bool>,
    pub pack_dir: Option<PathBuf>,
    pub errors: Vec<String>,
}

impl PipelineSummary {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// State threaded through one pipeline run.
pub struct PipelineContext<'a> {
    config: &'a SealConfig,
    options: &'a PipelineOptions,
    ledger: AuthorityLedger,
    log: TransparencyLog,
    summary: PipelineSummary,
}

impl<'a> PipelineContext<'a> {
    pub fn new(config: &'a SealConfig, options: &'a PipelineOptions) -> Self {
        Self {
            config,
            options,
            ledger: AuthorityLedger::open(config.authority_ledger()),
            log: TransparencyLog::open(config.transparency_log()),
            summary: PipelineSummary {
                decision_id: options.decision_id.clone(),
                authority_entry_id: options.authority_entry_id.clone(),
                ..PipelineSummary::default()
            },
        }
    }

    fn record_error(&mut self, step: &str, err: impl std::fmt::Display) {
        tracing::warn!(step, error = %err, "pipeline step failed");
        self.summary.errors.push(format!("{step}: {err}"));
    }

    /// Reuse an active `AUTO-<decision>` grant or append one. Revoked,
    /// expired and not-yet-effective grants are passed over for the next
    /// free `AUTO-<decision>-<n>` id.
    fn auto_authority(&mut self, decision: &DecisionState) -> Result<(), RunError> {
        let base = format!("AUTO-{}", decision.decision_id);
        let mut n = 1;
        let authority_id = loop {
            let candidate = if n == 1 {
                base.clone()
            } else {
                format!("{base}-{n}")
            };
            match self.ledger.status(&candidate, self.options.clock)? {
                AuthorityStatus::Unknown => break candidate,
                AuthorityStatus::Active => {
                    if let Some(existing) = self.ledger.find_grant(&candidate)? {
                        self.summary.authority_entry_id = Some(existing.body.entry_id);
                        return Ok(());
                    }
                    break candidate;
                }
                status => {
                    tracing::debug!(authority_id = %candidate, %status, "auto authority not reusable");
                    n += 1;
                }
            }
        };
        let policy_version = self.config.policy_version();
        let baseline = self.config.policy_baseline();
        let policy_hash = if baseline.is_file() {
            seal_core::sha256_file(&baseline)?
        } else {
            seal_core::sha256_raw(policy_version.as_bytes())
        };
        let entry = self.ledger.append(
            GrantRequest::new(
                authority_id,
                self.config.operator.clone(),
                self.config.operator_role.clone(),
                self.options.clock,
            )
            .scope(ScopeBound {
                decisions: vec![decision.decision_id.clone()],
                ..ScopeBound::default()
            })
            .policy(policy_version, policy_hash.to_string()),
        )?;
        self.summary.authority_entry_id = Some(entry.body.entry_id);
        Ok(())
    }

    fn abp(&mut self, decision: &DecisionState) -> Result<(), RunError> {
        match &self.options.abp {
            AbpSource::None => Ok(()),
            AbpSource::Load(path) => {
                load_abp(path)?;
                self.summary.abp_path = Some(path.clone());
                Ok(())
            }
            AbpSource::Build(abp_config) => {
                let Some(entry_id) = self.summary.authority_entry_id.clone() else {
                    return Err(RunError::Config(
                        "building an ABP needs an authority entry".into(),
                    ));
                };
                let authority_ref = resolve_authority_ref(&entry_id, &self.ledger)?;
                let scope = abp_config.scope.clone().unwrap_or_else(|| AbpScope {
                    contract_id: decision.decision_id.clone(),
                    program: decision.title.clone(),
                    modules: Vec::new(),
                });
                let abp = AbpBuilder::new(scope, authority_ref, self.options.clock)
                    .sections(&abp_config.sections)
                    .build()?;
                self.summary.abp_path = Some(write_abp(&abp, &self.config.out_dir())?);
                Ok(())
            }
        }
    }

    fn seal(&mut self) -> Result<SealOutcome, RunError> {
        let entry_id = self.summary.authority_entry_id.clone();
        let mut request = SealRequest::new(self.options.decision_id.clone()).clock(self.options.clock);
        if let Some(entry_id) = entry_id.as_deref() {
            request = request.authority(&self.ledger, entry_id);
        }
        let outcome = Assembler::new(self.config).seal(&request)?;
        self.summary.run_id = outcome.sealed.run_id().to_string();
        self.summary.commit_hash = outcome.sealed.commit_hash.clone();
        self.summary.content_hash = outcome.sealed.hash.clone();
        self.summary.sealed_path = outcome.sealed_path.clone();
        self.summary.manifest_path = outcome.manifest_path.clone();
        Ok(outcome)
    }

    fn sign(&mut self, outcome: &SealOutcome) {
        let options = self.options;
        for artifact in [&outcome.sealed_path, &outcome.manifest_path] {
            match sign_artifact(artifact, options.signer.as_ref(), &options.identity, options.clock) {
                Ok(path) => self.summary.sig_paths.push(path),
                Err(e) => self.record_error("sign", e),
            }
        }
        for witness in &options.witnesses {
            match append_signature(
                &outcome.sealed_path,
                witness.signer.as_ref(),
                &witness.identity,
                options.clock,
            ) {
                Ok(path) => {
                    if !self.summary.sig_paths.contains(&path) {
                        self.summary.sig_paths.push(path);
                    }
                }
                Err(e) => self.record_error("witness", e),
            }
        }
    }

    /// Append the sealed run to the transparency log unless an entry for the
    /// same commit and content hash is already there.
    fn log(&mut self, outcome: &SealOutcome) {
        match self.log.find_by_commit_hash(&outcome.sealed.commit_hash) {
            Ok(Some(existing))
                if existing.get("artifact_bytes_sha256").and_then(|v| v.as_str())
                    == Some(outcome.sealed.hash.as_str()) =>
            {
                self.summary.transparency_entry = existing
                    .get("entry_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                self.record_error("transparency", e);
                return;
            }
        }
        let request = LogAppend {
            run_id: outcome.sealed.run_id().to_string(),
            commit_hash: outcome.sealed.commit_hash.clone(),
            sealed_hash: outcome.sealed.hash.clone(),
            signing_key_id: Some(self.options.signer.key_id().to_string()),
            witness_key_id: self
                .options
                .witnesses
                .first()
                .map(|w| w.signer.key_id().to_string()),
            artifact_path: Some(self.config.display_path(&outcome.sealed_path)),
        };
        match self.log.append(request) {
            Ok(entry) => self.summary.transparency_entry = Some(entry.body.entry_id),
            Err(e) => self.record_error("transparency", e),
        }
    }

    fn audit(&mut self, outcome: &SealOutcome) {
        match audit_file(&outcome.sealed_path, true) {
            Ok(result) => {
                self.summary.audit_clean = Some(result.violations() == 0);
                if result.violations() > 0 {
                    self.record_error(
                        "audit",
                        format!("{} determinism violations", result.violations()),
                    );
                }
            }
            Err(e) => self.record_error("audit", e),
        }
    }

    fn replay(&mut self, outcome: &SealOutcome) {
        let threshold = (!self.options.witnesses.is_empty()).then(|| self.options.witnesses.len() + 1);
        let options = ReplayOptions {
            strict: true,
            root: Some(self.config.root.clone()),
            signature: Some(SignatureCheck {
                keys: self.options.verify_keys.clone(),
                threshold,
                sig_path: None,
            }),
            transparency_log: self
                .summary
                .transparency_entry
                .is_some()
                .then(|| self.log.path().to_path_buf()),
            authority_ledger: self
                .summary
                .authority_entry_id
                .is_some()
                .then(|| self.ledger.path().to_path_buf()),
            verify_at: None,
        };
        let report = replay_file(&outcome.sealed_path, &options);
        self.summary.replay_passed = Some(report.passed());
        if !report.passed() {
            let failed: Vec<String> = report.failures().map(|c| c.name.clone()).collect();
            self.record_error("replay", format!("{} failures: {}", failed.len(), failed.join(", ")));
        }
    }

    fn pack(&mut self, outcome: &SealOutcome, dir: &Path) {
        let contents = PackContents {
            sealed: outcome.sealed_path.clone(),
            manifest: outcome.manifest_path.clone(),
            signatures: self.summary.sig_paths.clone(),
            transparency_log: self
                .summary
                .transparency_entry
                .is_some()
                .then(|| self.log.path().to_path_buf()),
            authority_ledger: self
                .summary
                .authority_entry_id
                .is_some()
                .then(|| self.ledger.path().to_path_buf()),
            abp: self.summary.abp_path.clone(),
        };
        match assemble_pack(dir, &contents, outcome.sealed.run_id(), &outcome.sealed.commit_hash) {
            Ok(_) => self.summary.pack_dir = Some(dir.to_path_buf()),
            Err(e) => self.record_error("pack", e),
        }
    }

    pub fn run(mut self) -> Result<PipelineSummary, RunError> {
        let options = self.options;
        let decision = find_decision(&self.config.decision_log(), &options.decision_id)?;

        if options.auto_authority && self.summary.authority_entry_id.is_none() {
            if let Err(e) = self.auto_authority(&decision) {
                self.record_error("authority", e);
            }
        }
        if let Err(e) = self.abp(&decision) {
            self.record_error("abp", e);
        }

        let outcome = self.seal()?;
        self.sign(&outcome);
        if options.transparency {
            self.log(&outcome);
        }
        if options.audit {
            self.audit(&outcome);
        }
        if options.replay_check {
            self.replay(&outcome);
        }
        if let Some(dir) = &options.pack_dir {
            self.pack(&outcome, dir);
        }

        tracing::info!(
            decision_id = %self.summary.decision_id,
            run_id = %self.summary.run_id,
            errors = self.summary.errors.len(),
            "seal-and-prove finished"
        );
        Ok(self.summary)
    }
}

pub fn seal_and_prove(
    config: &SealConfig,
    options: &PipelineOptions,
) -> Result<PipelineSummary, RunError> {
    PipelineContext::new(config, options).run()
}
