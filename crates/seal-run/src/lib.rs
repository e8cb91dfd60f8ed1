//! # seal-run: Sealed Runs and Adversarial Replay
//!
//! Turns one decision from the decision log into a sealed, hash-committed,
//! authority-bound run artifact, and re-verifies such artifacts from nothing
//! but the bytes on disk.
//!
//! ## Sealing
//!
//! 1. [`HashScope::collect`] hashes every declared input, prompt, schema and
//!    policy file. Its canonical bytes give the commit hash, and the run id
//!    derives from that hash.
//! 2. [`InputsCommitments`] adds a Merkle root per category.
//! 3. [`AuthorityEnvelope::build`] records actor, authority, scope, policy
//!    snapshot, refusal checks and enforcement gates.
//! 4. [`Assembler`] writes the sealed run and its manifest in two passes, so
//!    that `artifacts_emitted` names both files' digests.
//!
//! ## Verifying
//!
//! - [`replay_file`] reports structural, hash, signature, transparency and
//!   authority checks separately.
//! - [`audit_file`] looks for nondeterminism.
//! - [`verify_pack`] checks a self-contained evidence pack.
//!
//! [`seal_and_prove`] runs the whole pipeline.

pub mod assembler;
pub mod audit;
pub mod commitments;
pub mod config;
pub mod decision;
pub mod envelope;
pub mod error;
pub mod orchestrator;
pub mod pack;
pub mod replay;
pub mod scope;
pub mod sealed;

#[cfg(test)]
mod testutil;

pub use assembler::{Assembler, AuthorityBinding, PreparedSeal, SealOutcome, SealRequest};
pub use audit::{audit_file, audit_text, AuditCheck, AuditLevel, AuditResult};
pub use commitments::InputsCommitments;
pub use config::SealConfig;
pub use decision::{count_csv_rows, find_decision, read_csv, DecisionState};
pub use envelope::{AuthorityEnvelope, AuthorityType, EnvelopeInputs};
pub use error::RunError;
pub use orchestrator::{
    seal_and_prove, AbpConfig, AbpSource, PipelineContext, PipelineOptions, PipelineSummary,
    Witness,
};
pub use pack::{assemble_pack, find_sealed, verify_pack, PackContents, PackManifest, PackVerifyOptions};
pub use replay::{replay_file, replay_value, ReplayOptions, SignatureCheck};
pub use scope::{Category, HashScope, ScopeFile};
pub use sealed::{compute_sealed_hash, SealManifest, SealedRun};
