//! # Replay Validator
//!
//! Adversarial re-verification of a sealed run. Never fails: every finding
//! lands in a [`VerificationReport`] and the worst severity decides the exit
//! code (0 pass, 1 inadmissible, 2 structural, 3 hash, 4 missing file).
//!
//! Checks run in a fixed order and each runs regardless of earlier outcomes.
//! Only a missing or unparseable file stops the replay.
//!
//! 1. file existence and JSON parse
//! 2. top-level keys, schema version, envelope structure, decision state,
//!    input snapshot hashes, replay instructions
//! 3. hash scope structure, `commit_hash` recompute, exclusions, run id
//! 4. merkle commitments per category (skipped when absent)
//! 5. on-disk input hashes, when a root is given
//! 6. strict file existence
//! 7. signatures
//! 8. transparency log cross-check
//! 9. authority ledger cross-check: chain integrity, grant window at
//!    sealing, revocation at sealing and now
//! 10. content hash, always last

use std::path::{Path, PathBuf};

use serde_json::Value;

use seal_core::{
    content_digest, det_id, sha256_file, ContentDigest, IdKind, Severity, Timestamp,
    VerificationReport,
};
use seal_crypto::{
    merkle_root, read_envelope, sig_path_for, verify_multisig, KeyRing, SignatureError,
};
use seal_ledger::{AuthorityLedger, TransparencyLog};

use crate::envelope::{AuthorityType, ENFORCEMENT_GATES, ENVELOPE_VERSION, REFUSAL_CHECKS};
use crate::scope::{Category, HashScope};
use crate::sealed::{compute_sealed_hash, REQUIRED_KEYS, SEALED_SCHEMA_VERSION};

const ENVELOPE_KEYS: [&str; 8] = [
    "envelope_version",
    "actor",
    "authority",
    "scope_bound",
    "policy_snapshot",
    "refusal",
    "enforcement",
    "provenance",
];
const DECISION_KEYS: [&str; 5] = ["decision_id", "title", "status", "confidence_pct", "priority_score"];
const REPLAY_KEYS: [&str; 3] = ["method", "command", "required_files"];
const SCOPE_KEYS: [&str; 7] = [
    "scope_version",
    "inputs",
    "prompts",
    "policies",
    "schemas",
    "parameters",
    "exclusions",
];

/// Signature verification settings.
#[derive(Debug, Clone, Default)]
pub struct SignatureCheck {
    pub keys: KeyRing,
    /// Overrides the envelope's recorded threshold.
    pub threshold: Option<usize>,
    /// Defaults to `<artifact>.sig.json`.
    pub sig_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Referenced input files and emitted artifacts must exist.
    pub strict: bool,
    /// Directory the hash-scope paths are relative to. Enables on-disk
    /// re-hashing.
    pub root: Option<PathBuf>,
    pub signature: Option<SignatureCheck>,
    pub transparency_log: Option<PathBuf>,
    pub authority_ledger: Option<PathBuf>,
    /// Time at which current revocation is judged. Defaults to now.
    pub verify_at: Option<Timestamp>,
}

fn missing_keys(obj: Option<&Value>, keys: &[&str]) -> Vec<String> {
    match obj.and_then(Value::as_object) {
        Some(map) => keys
            .iter()
            .filter(|k| !map.contains_key(**k))
            .map(|k| k.to_string())
            .collect(),
        None => keys.iter().map(|k| k.to_string()).collect(),
    }
}

fn check_keys(report: &mut VerificationReport, name: &str, obj: Option<&Value>, keys: &[&str]) {
    let missing = missing_keys(obj, keys);
    report.record(
        name,
        missing.is_empty(),
        if missing.is_empty() {
            "all present".to_string()
        } else {
            format!("missing: {}", missing.join(", "))
        },
        Severity::Structural,
    );
}

fn str_at<'v>(v: &'v Value, pointer: &str) -> Option<&'v str> {
    v.pointer(pointer).and_then(Value::as_str)
}

fn non_empty(v: &Value, pointer: &str) -> bool {
    str_at(v, pointer).is_some_and(|s| !s.is_empty())
}

fn string_list(v: Option<&Value>) -> Vec<&str> {
    v.and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn check_envelope(report: &mut VerificationReport, sealed: &Value) {
    let env = sealed.get("authority_envelope");
    check_keys(report, "envelope.keys", env, &ENVELOPE_KEYS);
    let env = env.cloned().unwrap_or(Value::Null);

    let version = str_at(&env, "/envelope_version").unwrap_or_default();
    report.record(
        "envelope.version",
        version == ENVELOPE_VERSION,
        format!("envelope_version={version:?}"),
        Severity::Structural,
    );

    report.record(
        "envelope.actor",
        non_empty(&env, "/actor/id") && non_empty(&env, "/actor/role"),
        "actor.id and actor.role",
        Severity::Structural,
    );

    let authority_type = str_at(&env, "/authority/type").unwrap_or_default();
    report.record(
        "envelope.authority.type",
        AuthorityType::NAMES.contains(&authority_type),
        format!("type={authority_type:?}"),
        Severity::Structural,
    );
    report.record(
        "envelope.authority.source",
        non_empty(&env, "/authority/source")
            && str_at(&env, "/authority/effective_at").is_some_and(|t| Timestamp::parse(t).is_ok()),
        "source and effective_at",
        Severity::Structural,
    );

    let decisions = string_list(env.pointer("/scope_bound/decisions"));
    report.record(
        "envelope.scope.decisions",
        !decisions.is_empty(),
        format!("{} decision(s) bound", decisions.len()),
        Severity::Structural,
    );

    check_keys(
        report,
        "envelope.policy.keys",
        env.get("policy_snapshot"),
        &["policy_version", "policy_hash", "prompt_hashes", "schema_version"],
    );

    let checks = string_list(env.pointer("/refusal/checks_performed"));
    report.record(
        "envelope.refusal.checks",
        checks == REFUSAL_CHECKS,
        format!("{} check(s) recorded", checks.len()),
        Severity::Structural,
    );
    let triggered = env
        .pointer("/refusal/refusal_triggered")
        .and_then(Value::as_bool);
    let reason = str_at(&env, "/refusal/refusal_reason_code").unwrap_or("unspecified");
    report.record(
        "envelope.refusal.not_triggered",
        triggered == Some(false),
        match triggered {
            Some(true) => format!("refusal triggered: {reason}"),
            Some(false) => "no refusal".to_string(),
            None => "refusal_triggered missing".to_string(),
        },
        if triggered.is_none() {
            Severity::Structural
        } else {
            Severity::Other
        },
    );

    let gates = string_list(env.pointer("/enforcement/gates_checked"));
    report.record(
        "envelope.enforcement.gates",
        gates == ENFORCEMENT_GATES,
        format!("{} gate(s) checked", gates.len()),
        Severity::Structural,
    );
    let failed: Vec<&str> = env
        .pointer("/enforcement/gate_outcomes")
        .and_then(Value::as_array)
        .map(|outcomes| {
            outcomes
                .iter()
                .filter(|o| o.get("result").and_then(Value::as_str) != Some("pass"))
                .map(|o| o.get("gate").and_then(Value::as_str).unwrap_or("?"))
                .collect()
        })
        .unwrap_or_default();
    report.record(
        "envelope.enforcement.outcomes",
        failed.is_empty(),
        if failed.is_empty() {
            "all gates pass".to_string()
        } else {
            format!("failed gates: {}", failed.join(", "))
        },
        Severity::Other,
    );

    check_keys(
        report,
        "envelope.provenance.keys",
        env.get("provenance"),
        &["created_at", "run_id", "deterministic_inputs_hash"],
    );
    report.record(
        "envelope.provenance.no_observed_at",
        env.pointer("/provenance/observed_at").is_none(),
        "observed_at kept out of hashed provenance",
        Severity::Structural,
    );
    let commit = str_at(sealed, "/commit_hash");
    let inputs_hash = str_at(&env, "/provenance/deterministic_inputs_hash");
    if commit.is_some() {
        report.record(
            "envelope.provenance.commit_hash",
            inputs_hash == commit,
            format!("provenance {inputs_hash:?}, sealed {commit:?}"),
            Severity::Hash,
        );
    }
}

fn check_body(report: &mut VerificationReport, sealed: &Value) {
    check_keys(report, "sealed_run.keys", Some(sealed), &REQUIRED_KEYS);
    let version = str_at(sealed, "/schema_version").unwrap_or_default();
    report.record(
        "schema_version",
        version == SEALED_SCHEMA_VERSION,
        format!("schema_version={version:?}"),
        Severity::Structural,
    );
    check_envelope(report, sealed);
    check_keys(report, "decision.keys", sealed.get("decision_state"), &DECISION_KEYS);

    let files = sealed
        .pointer("/inputs_snapshot/files")
        .and_then(Value::as_array);
    report.record(
        "inputs.files",
        files.is_some(),
        format!("{} input file(s)", files.map_or(0, Vec::len)),
        Severity::Structural,
    );
    for file in files.into_iter().flatten() {
        let path = file.get("path").and_then(Value::as_str).unwrap_or("?");
        let hash = file.get("sha256").and_then(Value::as_str);
        report.record(
            format!("inputs.hash[{path}]"),
            hash.is_some_and(|h| ContentDigest::parse(h).is_ok()),
            format!("sha256={hash:?}"),
            Severity::Structural,
        );
    }

    check_keys(report, "replay.keys", sealed.get("replay_instructions"), &REPLAY_KEYS);
}

/// Hash-scope checks. Returns the parsed scope for later stages.
fn check_scope(report: &mut VerificationReport, sealed: &Value) -> Option<HashScope> {
    let Some(scope_value) = sealed.get("hash_scope") else {
        report.pass("hash_scope.present", "absent; scope checks skipped");
        return None;
    };
    check_keys(report, "hash_scope.keys", Some(scope_value), &SCOPE_KEYS);

    let recorded = str_at(sealed, "/commit_hash").unwrap_or_default();
    match content_digest(scope_value) {
        Ok(computed) => {
            let computed = computed.to_string();
            report.record(
                "hash_scope.commit_hash",
                computed == recorded,
                format!("computed {computed}, recorded {recorded}"),
                Severity::Hash,
            );
        }
        Err(e) => report.fail("hash_scope.commit_hash", e.to_string(), Severity::Structural),
    }

    let exclusions = string_list(scope_value.get("exclusions"));
    report.record(
        "hash_scope.exclusions",
        exclusions.contains(&"observed_at"),
        format!("exclusions: {}", exclusions.join(", ")),
        Severity::Structural,
    );

    let run_id = str_at(sealed, "/authority_envelope/provenance/run_id").unwrap_or_default();
    match ContentDigest::parse(recorded) {
        Ok(commit) => {
            let expected = det_id(IdKind::Run, &commit);
            report.record(
                "hash_scope.run_id",
                expected == run_id,
                format!("derived {expected}, recorded {run_id}"),
                Severity::Hash,
            );
        }
        Err(e) => report.fail("hash_scope.run_id", e.to_string(), Severity::Structural),
    }

    match serde_json::from_value::<HashScope>(scope_value.clone()) {
        Ok(scope) => Some(scope),
        Err(e) => {
            report.fail("hash_scope.parse", e.to_string(), Severity::Structural);
            None
        }
    }
}

fn check_commitments(report: &mut VerificationReport, sealed: &Value, scope: Option<&HashScope>) {
    let Some(commitments) = sealed.get("inputs_commitments") else {
        report.pass("commitments.present", "absent; merkle checks skipped");
        return;
    };
    let Some(scope) = scope else {
        report.fail("commitments.scope", "no parseable hash_scope", Severity::Structural);
        return;
    };
    for category in Category::ALL {
        let name = format!("commitments.{}_root", category.as_str());
        let recorded = commitments
            .get(format!("{}_root", category.as_str()))
            .and_then(Value::as_str)
            .unwrap_or_default();
        match scope.leaves(category) {
            Ok(leaves) => {
                let computed = merkle_root(&leaves).to_string();
                report.record(
                    name,
                    computed == recorded,
                    format!("computed {computed}, recorded {recorded}"),
                    Severity::Hash,
                );
            }
            Err(e) => report.fail(name, e.to_string(), Severity::Structural),
        }
    }
}

/// Re-hash every scope file under `root` and recompute the commit hash from
/// what is on disk. Files that are absent are left to the strict checks.
fn check_disk(report: &mut VerificationReport, scope: &HashScope, root: &Path, recorded_commit: &str) {
    let mut on_disk = scope.clone();
    let mut complete = true;
    for category in Category::ALL {
        let files = match category {
            Category::Inputs => &mut on_disk.inputs,
            Category::Prompts => &mut on_disk.prompts,
            Category::Schemas => &mut on_disk.schemas,
            Category::Policies => &mut on_disk.policies,
        };
        for file in files.iter_mut() {
            let path = root.join(&file.path);
            if !path.is_file() {
                complete = false;
                continue;
            }
            match sha256_file(&path) {
                Ok(actual) => {
                    let actual = actual.to_string();
                    report.record(
                        format!("disk.sha256[{}]", file.path),
                        actual == file.sha256,
                        format!("disk {actual}, sealed {}", file.sha256),
                        Severity::Hash,
                    );
                    file.sha256 = actual;
                }
                Err(e) => {
                    complete = false;
                    report.fail(format!("disk.sha256[{}]", file.path), e.to_string(), Severity::Other);
                }
            }
        }
    }
    if !complete {
        report.pass("disk.commit_hash", "some scope files absent; recompute skipped");
        return;
    }
    match on_disk.commit_hash() {
        Ok(actual) => {
            let actual = actual.to_string();
            report.record(
                "disk.commit_hash",
                actual == recorded_commit,
                format!("disk {actual}, sealed {recorded_commit}"),
                Severity::Hash,
            );
        }
        Err(e) => report.fail("disk.commit_hash", e.to_string(), Severity::Structural),
    }
}

fn check_strict(
    report: &mut VerificationReport,
    sealed: &Value,
    root: Option<&Path>,
    artifact_dir: Option<&Path>,
) {
    match root {
        Some(root) => {
            for path in string_list(sealed.pointer("/replay_instructions/required_files")) {
                let exists = root.join(path).is_file();
                report.record(
                    format!("strict.file[{path}]"),
                    exists,
                    if exists { "present" } else { "missing" },
                    Severity::MissingFile,
                );
            }
        }
        None => report.fail("strict.root", "strict replay needs a root directory", Severity::Other),
    }
    if let Some(dir) = artifact_dir {
        for artifact in sealed
            .get("artifacts_emitted")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let path = artifact.get("path").and_then(Value::as_str).unwrap_or("?");
            let exists = dir.join(path).is_file();
            report.record(
                format!("strict.artifact[{path}]"),
                exists,
                if exists { "present" } else { "missing" },
                Severity::MissingFile,
            );
        }
    }
}

fn check_signature(
    report: &mut VerificationReport,
    sealed: &Value,
    artifact: Option<&Path>,
    check: &SignatureCheck,
) {
    let Some(sig_path) = check
        .sig_path
        .clone()
        .or_else(|| artifact.map(sig_path_for))
    else {
        report.fail("signature.envelope", "no signature path", Severity::Other);
        return;
    };
    let envelope = match read_envelope(&sig_path) {
        Ok(env) => env,
        Err(SignatureError::MissingEnvelope(p)) => {
            report.fail("signature.envelope", format!("missing {p}"), Severity::Other);
            return;
        }
        Err(e) => {
            report.fail("signature.envelope", e.to_string(), Severity::Structural);
            return;
        }
    };
    report.pass("signature.envelope", sig_path.display().to_string());
    match verify_multisig(sealed, &envelope, check.threshold, &check.keys) {
        Ok(outcome) => {
            report.record(
                "signature.valid",
                outcome.valid,
                format!("{}/{} valid", outcome.valid_count, outcome.required),
                Severity::Other,
            );
            report.absorb("multisig", outcome.report);
        }
        Err(e) => report.fail("signature.valid", e.to_string(), Severity::Other),
    }
}

fn check_transparency(report: &mut VerificationReport, sealed: &Value, log_path: &Path) {
    let log = TransparencyLog::open(log_path);
    let commit = str_at(sealed, "/commit_hash").unwrap_or_default();
    let sealed_hash = str_at(sealed, "/hash").unwrap_or_default();
    match log.find_by_commit_hash(commit) {
        Ok(Some(entry)) => {
            report.pass(
                "transparency.entry_found",
                entry
                    .get("entry_id")
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string(),
            );
            report.absorb("transparency", seal_ledger::verify_entry(&entry, sealed_hash));
        }
        Ok(None) => report.fail(
            "transparency.entry_found",
            format!("no entry for {commit} in {}", log_path.display()),
            Severity::Other,
        ),
        Err(e) => report.fail("transparency.entry_found", e.to_string(), Severity::Structural),
    }
}

fn check_authority(
    report: &mut VerificationReport,
    sealed: &Value,
    ledger_path: &Path,
    verify_at: Timestamp,
) {
    let Some(reference) = sealed.get("authority_ledger_ref") else {
        report.pass("authority.ref", "no authority_ledger_ref; skipped");
        return;
    };
    let entry_id = str_at(reference, "/entry_id").unwrap_or_default();
    let ledger = AuthorityLedger::open(ledger_path);
    let chain = ledger.verify();
    match chain.checks().iter().find(|c| !c.passed) {
        None => report.pass(
            "authority.ledger_chain",
            format!("{} checks over {}", chain.len(), ledger_path.display()),
        ),
        Some(broken) => report.fail(
            "authority.ledger_chain",
            format!("{}: {}", broken.name, broken.detail),
            broken.severity.unwrap_or(Severity::Hash),
        ),
    }
    let entry = match ledger.find_entry(entry_id) {
        Ok(Some(entry)) => {
            report.pass("authority.entry_found", entry_id.to_string());
            entry
        }
        Ok(None) => {
            report.fail(
                "authority.entry_found",
                format!("{entry_id} not in {}", ledger_path.display()),
                Severity::Other,
            );
            return;
        }
        Err(e) => {
            report.fail("authority.entry_found", e.to_string(), Severity::Structural);
            return;
        }
    };

    let recorded = str_at(reference, "/entry_hash").unwrap_or_default();
    report.record(
        "authority.entry_hash",
        entry.entry_hash == recorded,
        format!("ledger {}, sealed {recorded}", entry.entry_hash),
        Severity::Hash,
    );

    let authority_id = &entry.body.authority_id;
    let sealed_at = str_at(sealed, "/authority_envelope/provenance/created_at")
        .and_then(|t| Timestamp::parse(t).ok());
    match sealed_at {
        Some(at) => {
            let grant = &entry.body;
            report.record(
                "authority.not_expired_at_seal",
                grant.in_window(at),
                format!(
                    "{authority_id} window {} to {}, sealed {at}",
                    grant.effective_at,
                    grant
                        .expires_at
                        .map_or_else(|| "open".to_string(), |t| t.to_string())
                ),
                Severity::Other,
            );
        }
        None => report.fail(
            "authority.not_expired_at_seal",
            "no sealing time recorded",
            Severity::Structural,
        ),
    }
    for (name, at) in [
        ("authority.not_revoked_at_seal", sealed_at),
        ("authority.not_revoked_now", Some(verify_at)),
    ] {
        let Some(at) = at else {
            report.fail(name, "no sealing time recorded", Severity::Structural);
            continue;
        };
        match ledger.revocation_of(authority_id, at) {
            Ok(None) => report.pass(name, format!("{authority_id} not revoked at {at}")),
            Ok(Some(rev)) => report.fail(
                name,
                format!(
                    "{authority_id} revoked at {}: {}",
                    rev.revoked_at.map(|t| t.to_string()).unwrap_or_default(),
                    rev.revocation_reason.unwrap_or_default()
                ),
                Severity::Other,
            ),
            Err(e) => report.fail(name, e.to_string(), Severity::Structural),
        }
    }
}

fn check_content_hash(report: &mut VerificationReport, sealed: &Value) {
    let recorded = str_at(sealed, "/hash").unwrap_or_default();
    match compute_sealed_hash(sealed) {
        Ok(computed) => report.record(
            "hash.integrity",
            computed == recorded,
            format!("computed {computed}, recorded {recorded}"),
            Severity::Hash,
        ),
        Err(e) => {
            report.fail("hash.integrity", e.to_string(), Severity::Structural);
            false
        }
    };
}

/// Replay a parsed sealed run. `artifact` is its location on disk, used for
/// the default signature path and the emitted-artifact checks.
pub fn replay_value(sealed: &Value, artifact: Option<&Path>, options: &ReplayOptions) -> VerificationReport {
    let mut report = VerificationReport::new();
    check_body(&mut report, sealed);
    let scope = check_scope(&mut report, sealed);
    check_commitments(&mut report, sealed, scope.as_ref());

    if let (Some(root), Some(scope)) = (options.root.as_deref(), scope.as_ref()) {
        check_disk(
            &mut report,
            scope,
            root,
            str_at(sealed, "/commit_hash").unwrap_or_default(),
        );
    }
    if options.strict {
        check_strict(
            &mut report,
            sealed,
            options.root.as_deref(),
            artifact.and_then(Path::parent),
        );
    }
    if let Some(check) = &options.signature {
        check_signature(&mut report, sealed, artifact, check);
    }
    if let Some(log) = &options.transparency_log {
        check_transparency(&mut report, sealed, log);
    }
    if let Some(ledger) = &options.authority_ledger {
        check_authority(
            &mut report,
            sealed,
            ledger,
            options.verify_at.unwrap_or_else(Timestamp::now),
        );
    }
    check_content_hash(&mut report, sealed);

    tracing::debug!(
        checks = report.len(),
        exit_code = report.exit_code(),
        "replay finished"
    );
    report
}

/// Replay a sealed run from disk.
pub fn replay_file(path: &Path, options: &ReplayOptions) -> VerificationReport {
    let mut report = VerificationReport::new();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            report.fail(
                "file.exists",
                format!("{}: {e}", path.display()),
                Severity::MissingFile,
            );
            return report;
        }
    };
    report.pass("file.exists", path.display().to_string());
    let sealed: Value = match serde_json::from_str(&text) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => {
            report.fail("file.json", "top level is not a JSON object", Severity::Structural);
            return report;
        }
        Err(e) => {
            report.fail("file.json", e.to_string(), Severity::Structural);
            return report;
        }
    };
    report.pass("file.json", "parsed");
    report.extend(replay_value(&sealed, Some(path), options));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{Assembler, SealRequest};
    use crate::testutil::{clock, fixture};
    use serde_json::json;

    fn sealed_value(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn fresh_seal_replays_clean() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let opts = ReplayOptions {
            strict: true,
            root: Some(cfg.root.clone()),
            ..ReplayOptions::default()
        };
        let report = replay_file(&out.sealed_path, &opts);
        assert!(report.passed(), "{report}");
        assert_eq!(report.checks().first().unwrap().name, "file.exists");
        assert_eq!(report.checks().last().unwrap().name, "hash.integrity");
        assert!(report.get("commitments.inputs_root").unwrap().passed);
        assert!(report.get("disk.commit_hash").unwrap().passed);
    }

    #[test]
    fn missing_and_malformed_files_abort() {
        let dir = tempfile::tempdir().unwrap();
        let missing = replay_file(&dir.path().join("nope.json"), &ReplayOptions::default());
        assert_eq!(missing.exit_code(), 4);
        assert_eq!(missing.len(), 1);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        let report = replay_file(&bad, &ReplayOptions::default());
        assert_eq!(report.exit_code(), 2);
        assert!(report.get("sealed_run.keys").is_none());
    }

    #[test]
    fn structural_damage_does_not_stop_later_checks() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let mut v = sealed_value(&out.sealed_path);
        v.as_object_mut().unwrap().remove("decision_state");
        let report = replay_value(&v, None, &ReplayOptions::default());
        assert!(!report.get("sealed_run.keys").unwrap().passed);
        assert!(report.get("hash.integrity").is_some());
        assert_eq!(report.exit_code(), 3);
    }

    #[test]
    fn tampered_commitment_is_hash_severity() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let mut v = sealed_value(&out.sealed_path);
        v["inputs_commitments"]["prompts_root"] = json!(format!("sha256:{}", "0".repeat(64)));
        let report = replay_value(&v, None, &ReplayOptions::default());
        assert!(!report.get("commitments.prompts_root").unwrap().passed);
        assert!(report.get("commitments.inputs_root").unwrap().passed);
        assert_eq!(report.exit_code(), 3);
    }

    #[test]
    fn legacy_artifact_without_scope_skips_gracefully() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let mut v = sealed_value(&out.sealed_path);
        let map = v.as_object_mut().unwrap();
        map.remove("hash_scope");
        map.remove("inputs_commitments");
        map.remove("commit_hash");
        let hash = compute_sealed_hash(&v).unwrap();
        v["hash"] = json!(hash);
        let report = replay_value(&v, None, &ReplayOptions::default());
        assert!(report.passed(), "{report}");
        assert!(report.get("hash_scope.present").unwrap().passed);
    }

    #[test]
    fn strict_mode_reports_missing_inputs() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        std::fs::remove_file(cfg.data_dir().join("risks.csv")).unwrap();
        let root = Some(cfg.root.clone());
        let lenient = replay_file(
            &out.sealed_path,
            &ReplayOptions {
                root: root.clone(),
                ..ReplayOptions::default()
            },
        );
        assert!(lenient.passed(), "{lenient}");
        let strict = replay_file(
            &out.sealed_path,
            &ReplayOptions {
                strict: true,
                root,
                ..ReplayOptions::default()
            },
        );
        assert_eq!(strict.exit_code(), 4);
        assert!(!strict.get("strict.file[artifacts/sample_data/risks.csv]").unwrap().passed);
    }

    #[test]
    fn missing_signature_envelope_is_inadmissible() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let report = replay_file(
            &out.sealed_path,
            &ReplayOptions {
                signature: Some(SignatureCheck::default()),
                ..ReplayOptions::default()
            },
        );
        assert_eq!(report.exit_code(), 1);
        assert!(!report.get("signature.envelope").unwrap().passed);
    }
}
