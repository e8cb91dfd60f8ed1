//! # Signature Envelopes
//!
//! A signed artifact `X.json` has a sibling `X.json.sig.json` holding either a
//! single signature block or a multisig envelope. Signatures cover the JCS
//! canonical bytes of the parsed artifact.
//!
//! ## Verification
//!
//! [`verify_multisig`] checks every signature independently and never stops
//! at the first failure: the report carries one check per signature, a
//! distinct-key check and a quorum check. Only signatures from distinct key
//! ids count towards the threshold.
//!
//! A missing envelope file is [`SignatureError::MissingEnvelope`], not an
//! invalid signature.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use seal_core::fsio::write_json_atomic;
use seal_core::{sha256_digest, CanonicalBytes, Severity, Timestamp, VerificationReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ed25519::{self, Ed25519PublicKey};
use crate::error::SignatureError;
use crate::hmac::HmacKey;
use crate::signer::{ArtifactSigner, SignatureAlgorithm};

pub const SIG_VERSION: &str = "1.0";
pub const MULTISIG_VERSION: &str = "1.0";

/// What kind of artifact a signature covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    SealedRun,
    Manifest,
}

impl PayloadType {
    /// Inferred from the file name: `*.manifest.*` is a manifest.
    pub fn for_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.contains(".manifest.") {
            Self::Manifest
        } else {
            Self::SealedRun
        }
    }
}

/// Who signed, for audit display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerIdentity {
    pub signer_id: Option<String>,
    pub role: Option<String>,
    pub signer_type: Option<String>,
}

impl SignerIdentity {
    pub fn new(signer_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            signer_id: Some(signer_id.into()),
            role: Some(role.into()),
            signer_type: None,
        }
    }
}

/// Single-signature form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub sig_version: String,
    pub algorithm: SignatureAlgorithm,
    pub signing_key_id: String,
    pub signed_at: Timestamp,
    pub payload_type: PayloadType,
    pub payload_commit_hash: String,
    pub payload_bytes_sha256: String,
    pub signature: String,
    pub public_key: Option<String>,
    pub signer_id: Option<String>,
    pub role: Option<String>,
    pub signer_type: Option<String>,
}

/// One entry of a multisig envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigEntry {
    pub signer_id: String,
    pub role: String,
    pub algorithm: SignatureAlgorithm,
    pub signing_key_id: String,
    pub signed_at: Timestamp,
    pub signature: String,
    pub public_key: Option<String>,
}

/// Multi-signature form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigEnvelope {
    pub multisig_version: String,
    pub artifact_hash: String,
    pub threshold: usize,
    pub signatures: Vec<MultisigEntry>,
    #[serde(default)]
    pub witness_requirements: Option<Value>,
}

/// Either envelope shape, as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignatureEnvelope {
    Multi(MultisigEnvelope),
    Single(SignatureBlock),
}

impl SignatureEnvelope {
    /// All signatures as multisig entries.
    pub fn entries(&self) -> Vec<MultisigEntry> {
        match self {
            Self::Multi(m) => m.signatures.clone(),
            Self::Single(b) => vec![b.to_entry()],
        }
    }

    /// Threshold implied by the envelope: 1 for a single block.
    pub fn default_threshold(&self) -> usize {
        match self {
            Self::Multi(m) => m.threshold.max(1),
            Self::Single(_) => 1,
        }
    }
}

impl SignatureBlock {
    fn to_entry(&self) -> MultisigEntry {
        MultisigEntry {
            signer_id: self
                .signer_id
                .clone()
                .unwrap_or_else(|| self.signing_key_id.clone()),
            role: self.role.clone().unwrap_or_else(|| "operator".into()),
            algorithm: self.algorithm,
            signing_key_id: self.signing_key_id.clone(),
            signed_at: self.signed_at,
            signature: self.signature.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// `<artifact>.sig.json`.
pub fn sig_path_for(artifact: &Path) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".sig.json");
    artifact.with_file_name(name)
}

/// Parse an artifact file and canonicalize it.
pub fn load_canonical(artifact: &Path) -> Result<(Value, CanonicalBytes), SignatureError> {
    let value: Value = seal_core::fsio::read_json(artifact)?;
    let canonical = CanonicalBytes::new(&value)?;
    Ok((value, canonical))
}

/// Sign `artifact` and build a single signature block.
pub fn build_signature_block(
    artifact: &Path,
    signer: &dyn ArtifactSigner,
    identity: &SignerIdentity,
    signed_at: Timestamp,
) -> Result<SignatureBlock, SignatureError> {
    let (value, canonical) = load_canonical(artifact)?;
    let commit_hash = value
        .get("commit_hash")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let out = signer.sign(&canonical)?;
    Ok(SignatureBlock {
        sig_version: SIG_VERSION.into(),
        algorithm: signer.algorithm(),
        signing_key_id: signer.key_id().to_string(),
        signed_at,
        payload_type: PayloadType::for_path(artifact),
        payload_commit_hash: commit_hash,
        payload_bytes_sha256: sha256_digest(&canonical).to_string(),
        signature: out.signature,
        public_key: out.public_key,
        signer_id: identity.signer_id.clone(),
        role: identity.role.clone(),
        signer_type: identity.signer_type.clone(),
    })
}

/// Sign `artifact` and write a fresh single-signature envelope next to it.
pub fn sign_artifact(
    artifact: &Path,
    signer: &dyn ArtifactSigner,
    identity: &SignerIdentity,
    signed_at: Timestamp,
) -> Result<PathBuf, SignatureError> {
    let block = build_signature_block(artifact, signer, identity, signed_at)?;
    let sig_path = sig_path_for(artifact);
    write_json_atomic(&sig_path, &block)?;
    tracing::info!(artifact = %artifact.display(), key_id = %block.signing_key_id, "artifact signed");
    Ok(sig_path)
}

/// Add a signature to the artifact's envelope, upgrading a single block to a
/// multisig envelope. Creates a one-entry multisig envelope when none exists.
pub fn append_signature(
    artifact: &Path,
    signer: &dyn ArtifactSigner,
    identity: &SignerIdentity,
    signed_at: Timestamp,
) -> Result<PathBuf, SignatureError> {
    let block = build_signature_block(artifact, signer, identity, signed_at)?;
    let new_entry = block.to_entry();
    let sig_path = sig_path_for(artifact);

    let envelope = match read_envelope(&sig_path) {
        Ok(SignatureEnvelope::Multi(mut m)) => {
            m.signatures.push(new_entry);
            m
        }
        Ok(SignatureEnvelope::Single(existing)) => MultisigEnvelope {
            multisig_version: MULTISIG_VERSION.into(),
            artifact_hash: existing.payload_bytes_sha256.clone(),
            threshold: 1,
            signatures: vec![existing.to_entry(), new_entry],
            witness_requirements: None,
        },
        Err(SignatureError::MissingEnvelope(_)) => MultisigEnvelope {
            multisig_version: MULTISIG_VERSION.into(),
            artifact_hash: block.payload_bytes_sha256.clone(),
            threshold: 1,
            signatures: vec![new_entry],
            witness_requirements: None,
        },
        Err(e) => return Err(e),
    };
    write_json_atomic(&sig_path, &envelope)?;
    tracing::info!(
        artifact = %artifact.display(),
        signatures = envelope.signatures.len(),
        "signature appended"
    );
    Ok(sig_path)
}

/// Load an envelope file.
pub fn read_envelope(sig_path: &Path) -> Result<SignatureEnvelope, SignatureError> {
    if !sig_path.exists() {
        return Err(SignatureError::MissingEnvelope(sig_path.display().to_string()));
    }
    let value: Value = seal_core::fsio::read_json(sig_path)?;
    serde_json::from_value(value)
        .map_err(|e| SignatureError::UnknownFormat(format!("{}: {e}", sig_path.display())))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verification key for one key id.
#[derive(Debug, Clone)]
pub enum VerifyKey {
    Hmac(HmacKey),
    Ed25519(Ed25519PublicKey),
}

/// Keys available to a verifier.
///
/// Per-key-id entries take precedence. Otherwise a shared HMAC key verifies
/// HMAC signatures and a shared public key verifies Ed25519 signatures. The
/// `public_key` carried inside a signature block is never trusted: anyone
/// can mint a key pair and sign with it.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    by_key_id: BTreeMap<String, VerifyKey>,
    shared_hmac: Option<HmacKey>,
    shared_public: Option<Ed25519PublicKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key_id: impl Into<String>, key: VerifyKey) -> Self {
        self.by_key_id.insert(key_id.into(), key);
        self
    }

    pub fn with_shared_hmac(mut self, key: HmacKey) -> Self {
        self.shared_hmac = Some(key);
        self
    }

    pub fn with_shared_public(mut self, key: Ed25519PublicKey) -> Self {
        self.shared_public = Some(key);
        self
    }

    fn verify_entry(&self, data: &CanonicalBytes, entry: &MultisigEntry) -> bool {
        match (self.by_key_id.get(&entry.signing_key_id), entry.algorithm) {
            (Some(VerifyKey::Hmac(k)), SignatureAlgorithm::HmacSha256) => {
                k.verify_base64(data, &entry.signature)
            }
            (Some(VerifyKey::Ed25519(pk)), SignatureAlgorithm::Ed25519) => {
                ed25519::verify_base64(data, &entry.signature, &pk.to_base64())
            }
            (Some(_), _) => false,
            (None, SignatureAlgorithm::HmacSha256) => self
                .shared_hmac
                .as_ref()
                .is_some_and(|k| k.verify_base64(data, &entry.signature)),
            (None, SignatureAlgorithm::Ed25519) => self
                .shared_public
                .as_ref()
                .is_some_and(|pk| ed25519::verify_base64(data, &entry.signature, &pk.to_base64())),
        }
    }
}

/// Result of a threshold verification.
#[derive(Debug, Clone)]
pub struct MultisigOutcome {
    /// Quorum met and every valid signature came from a distinct key.
    pub valid: bool,
    /// Valid signatures from distinct key ids.
    pub valid_count: usize,
    pub required: usize,
    pub report: VerificationReport,
}

/// Verify every signature in `envelope` against `artifact`.
///
/// `threshold` overrides the envelope's own; `None` uses 1 for a single
/// block and the recorded threshold for a multisig envelope.
pub fn verify_multisig(
    artifact: &Value,
    envelope: &SignatureEnvelope,
    threshold: Option<usize>,
    keys: &KeyRing,
) -> Result<MultisigOutcome, SignatureError> {
    let canonical = CanonicalBytes::new(artifact)?;
    let required = threshold.unwrap_or_else(|| envelope.default_threshold());
    let mut report = VerificationReport::new();

    if let SignatureEnvelope::Multi(m) = envelope {
        report.record(
            "version",
            m.multisig_version == MULTISIG_VERSION,
            format!("multisig_version={}", m.multisig_version),
            Severity::Structural,
        );
    }
    let expected_hash = match envelope {
        SignatureEnvelope::Multi(m) => &m.artifact_hash,
        SignatureEnvelope::Single(b) => &b.payload_bytes_sha256,
    };
    let actual_hash = sha256_digest(&canonical).to_string();
    report.record(
        "artifact_hash",
        expected_hash.is_empty() || *expected_hash == actual_hash,
        format!("recorded {expected_hash}, computed {actual_hash}"),
        Severity::Hash,
    );

    let mut valid_raw = 0usize;
    let mut distinct: BTreeSet<String> = BTreeSet::new();
    for (i, entry) in envelope.entries().iter().enumerate() {
        let ok = keys.verify_entry(&canonical, entry);
        report.record(
            format!("sig[{i}]"),
            ok,
            format!(
                "{} ({}) key={} algo={}",
                entry.signer_id, entry.role, entry.signing_key_id, entry.algorithm
            ),
            Severity::Other,
        );
        if ok {
            valid_raw += 1;
            distinct.insert(entry.signing_key_id.clone());
        }
    }
    let valid_count = distinct.len();
    let distinct_ok = report.record(
        "distinct_keys",
        valid_count == valid_raw,
        format!("{valid_count} distinct keys from {valid_raw} valid signatures"),
        Severity::Other,
    );
    let quorum_ok = report.record(
        "quorum",
        valid_count >= required,
        format!("{valid_count}/{required} valid signatures"),
        Severity::Other,
    );

    Ok(MultisigOutcome {
        valid: quorum_ok && distinct_ok,
        valid_count,
        required,
        report,
    })
}

/// Load `artifact` and its sibling envelope and verify them.
pub fn verify_artifact_file(
    artifact: &Path,
    threshold: Option<usize>,
    keys: &KeyRing,
) -> Result<MultisigOutcome, SignatureError> {
    let envelope = read_envelope(&sig_path_for(artifact))?;
    let (value, _) = load_canonical(artifact)?;
    verify_multisig(&value, &envelope, threshold, keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::Ed25519KeyPair;
    use crate::signer::{Ed25519Signer, HmacSigner};
    use serde_json::json;

    fn clock() -> Timestamp {
        Timestamp::parse("2026-02-21T00:00:00Z").unwrap()
    }

    fn write_artifact(dir: &Path) -> PathBuf {
        let path = dir.join("RUN-abc12345_20260221T000000Z.json");
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&json!({"commit_hash": "sha256:c0ffee", "hash": "h"}))
                .unwrap(),
        )
        .unwrap();
        path
    }

    fn hmac_signer(id: &str, secret: &[u8]) -> HmacSigner {
        HmacSigner::new(id, HmacKey::from_bytes(secret.to_vec()).unwrap())
    }

    #[test]
    fn sig_path_appends_suffix() {
        assert_eq!(
            sig_path_for(Path::new("/out/RUN-1_x.json")),
            Path::new("/out/RUN-1_x.json.sig.json")
        );
    }

    #[test]
    fn payload_type_from_name() {
        assert_eq!(
            PayloadType::for_path(Path::new("RUN-1_x.manifest.json")),
            PayloadType::Manifest
        );
        assert_eq!(
            PayloadType::for_path(Path::new("RUN-1_x.json")),
            PayloadType::SealedRun
        );
    }

    #[test]
    fn single_block_verifies_with_threshold_one() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());
        let signer = hmac_signer("k1", b"secret-one");
        let sig = sign_artifact(&artifact, &signer, &SignerIdentity::default(), clock()).unwrap();
        let env = read_envelope(&sig).unwrap();
        let SignatureEnvelope::Single(block) = &env else {
            panic!("expected single block");
        };
        assert_eq!(block.payload_commit_hash, "sha256:c0ffee");
        assert_eq!(block.payload_type, PayloadType::SealedRun);

        let keys = KeyRing::new().with_shared_hmac(HmacKey::from_bytes(b"secret-one".to_vec()).unwrap());
        let out = verify_artifact_file(&artifact, None, &keys).unwrap();
        assert!(out.valid);
        assert_eq!(out.valid_count, 1);
        assert_eq!(out.required, 1);
    }

    #[test]
    fn append_upgrades_single_to_multisig() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());
        sign_artifact(&artifact, &hmac_signer("k1", b"s1"), &SignerIdentity::default(), clock())
            .unwrap();
        let sig = append_signature(
            &artifact,
            &hmac_signer("k2", b"s2"),
            &SignerIdentity::new("bob", "witness"),
            clock(),
        )
        .unwrap();
        let SignatureEnvelope::Multi(m) = read_envelope(&sig).unwrap() else {
            panic!("expected multisig");
        };
        assert_eq!(m.signatures.len(), 2);
        assert_eq!(m.signatures[0].signer_id, "k1");
        assert_eq!(m.signatures[0].role, "operator");
        assert_eq!(m.signatures[1].signer_id, "bob");
    }

    #[test]
    fn reports_every_signature_without_short_circuit() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());
        append_signature(&artifact, &hmac_signer("k1", b"s1"), &SignerIdentity::default(), clock())
            .unwrap();
        append_signature(&artifact, &hmac_signer("k2", b"wrong"), &SignerIdentity::default(), clock())
            .unwrap();
        append_signature(&artifact, &hmac_signer("k3", b"s3"), &SignerIdentity::default(), clock())
            .unwrap();
        let keys = KeyRing::new()
            .with_key("k1", VerifyKey::Hmac(HmacKey::from_bytes(b"s1".to_vec()).unwrap()))
            .with_key("k2", VerifyKey::Hmac(HmacKey::from_bytes(b"s2".to_vec()).unwrap()))
            .with_key("k3", VerifyKey::Hmac(HmacKey::from_bytes(b"s3".to_vec()).unwrap()));
        let out = verify_artifact_file(&artifact, Some(3), &keys).unwrap();
        assert!(!out.valid);
        assert_eq!(out.valid_count, 2);
        assert!(out.report.get("sig[0]").unwrap().passed);
        assert!(!out.report.get("sig[1]").unwrap().passed);
        assert!(out.report.get("sig[2]").unwrap().passed);
        assert!(!out.report.get("quorum").unwrap().passed);
    }

    #[test]
    fn duplicate_key_counts_once() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());
        let s = hmac_signer("k1", b"s1");
        append_signature(&artifact, &s, &SignerIdentity::default(), clock()).unwrap();
        append_signature(&artifact, &s, &SignerIdentity::default(), clock()).unwrap();
        let keys = KeyRing::new().with_shared_hmac(HmacKey::from_bytes(b"s1".to_vec()).unwrap());
        let out = verify_artifact_file(&artifact, Some(2), &keys).unwrap();
        assert_eq!(out.valid_count, 1);
        assert!(!out.valid);
        assert!(!out.report.get("distinct_keys").unwrap().passed);
    }

    #[test]
    fn ed25519_verifies_against_supplied_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());
        let pair = Ed25519KeyPair::from_seed(&[4u8; 32]);
        let public = pair.public_key();
        sign_artifact(&artifact, &Ed25519Signer::new("ed1", pair), &SignerIdentity::default(), clock())
            .unwrap();
        let out = verify_artifact_file(&artifact, None, &KeyRing::new().with_shared_public(public))
            .unwrap();
        assert!(out.valid);
    }

    #[test]
    fn embedded_public_keys_do_not_count_toward_quorum() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());
        for (id, seed) in [("mallory-1", 7u8), ("mallory-2", 8u8)] {
            let signer = Ed25519Signer::new(id, Ed25519KeyPair::from_seed(&[seed; 32]));
            append_signature(&artifact, &signer, &SignerIdentity::default(), clock()).unwrap();
        }
        let out = verify_artifact_file(&artifact, Some(2), &KeyRing::new()).unwrap();
        assert!(!out.valid);
        assert_eq!(out.valid_count, 0);
        assert!(!out.report.get("sig[0]").unwrap().passed);
        assert!(!out.report.get("sig[1]").unwrap().passed);

        // A trusted key admits only its own signature.
        let trusted = KeyRing::new().with_key(
            "mallory-1",
            VerifyKey::Ed25519(Ed25519KeyPair::from_seed(&[7u8; 32]).public_key()),
        );
        let out = verify_artifact_file(&artifact, Some(2), &trusted).unwrap();
        assert_eq!(out.valid_count, 1);
        assert!(!out.valid);
    }

    #[test]
    fn tampered_artifact_fails() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());
        sign_artifact(&artifact, &hmac_signer("k1", b"s1"), &SignerIdentity::default(), clock())
            .unwrap();
        std::fs::write(&artifact, r#"{"commit_hash":"sha256:c0ffee","hash":"tampered"}"#).unwrap();
        let keys = KeyRing::new().with_shared_hmac(HmacKey::from_bytes(b"s1".to_vec()).unwrap());
        let out = verify_artifact_file(&artifact, None, &keys).unwrap();
        assert!(!out.valid);
        assert!(!out.report.get("artifact_hash").unwrap().passed);
    }

    #[test]
    fn missing_envelope_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = write_artifact(dir.path());
        let err = verify_artifact_file(&artifact, None, &KeyRing::new()).unwrap_err();
        assert!(matches!(err, SignatureError::MissingEnvelope(_)));
    }
}
