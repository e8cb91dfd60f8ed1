//! # Evidence Pack
//!
//! A self-contained directory an outside party can verify without the
//! producing workspace: the sealed run, its manifest, every signature
//! envelope, copies of the transparency log and authority ledger, the ABP
//! when one was built, `VERIFY_INSTRUCTIONS.md`, and `pack_manifest.json`
//! listing the sha256 of each file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use seal_abp::{verify_abp_file, ABP_FILE};
use seal_core::fsio::{atomic_write, write_json_atomic};
use seal_core::{sha256_file, Severity, Timestamp, VerificationReport};
use seal_crypto::{verify_artifact_file, KeyRing};
use seal_ledger::{AuthorityLedger, TransparencyLog};

use crate::audit::{audit_file, AuditLevel};
use crate::error::RunError;
use crate::replay::{replay_file, ReplayOptions, SignatureCheck};
use crate::sealed::SEALED_SCHEMA_VERSION;

pub const PACK_VERSION: &str = "1.0";
pub const PACK_MANIFEST_FILE: &str = "pack_manifest.json";
pub const PACK_TRANSPARENCY_FILE: &str = "transparency_log.ndjson";
pub const PACK_AUTHORITY_FILE: &str = "authority_ledger.ndjson";
pub const INSTRUCTIONS_FILE: &str = "VERIFY_INSTRUCTIONS.md";

const SIG_SUFFIX: &str = ".sig.json";

/// Source files for a pack.
#[derive(Debug, Clone, Default)]
pub struct PackContents {
    pub sealed: PathBuf,
    pub manifest: PathBuf,
    pub signatures: Vec<PathBuf>,
    pub transparency_log: Option<PathBuf>,
    pub authority_ledger: Option<PathBuf>,
    pub abp: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackManifest {
    pub pack_version: String,
    pub run_id: String,
    pub commit_hash: String,
    /// File name → sha256, excluding the pack manifest itself.
    pub files: BTreeMap<String, String>,
}

fn file_name(path: &Path) -> Result<String, RunError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| RunError::MissingInput(format!("no file name in {}", path.display())))
}

fn instructions(run_id: &str, sealed_name: &str, signed: bool) -> String {
    let key = if signed { " --key \"$SEAL_SIGNING_KEY\"" } else { "" };
    format!(
        "# Verifying {run_id}\n\n\
         Sealed run: `{sealed_name}`\n\n\
         Verify every artifact in this directory:\n\n\
         ```\nseal pack verify --pack .{key}\n```\n\n\
         Replay the sealed run alone:\n\n\
         ```\nseal replay {sealed_name}{key} --transparency-log {PACK_TRANSPARENCY_FILE} \
         --authority-ledger {PACK_AUTHORITY_FILE}\n```\n\n\
         `{PACK_MANIFEST_FILE}` lists the sha256 of each file.\n"
    )
}

/// Copy `contents` into `dir` and write the instructions and pack manifest.
pub fn assemble_pack(
    dir: &Path,
    contents: &PackContents,
    run_id: &str,
    commit_hash: &str,
) -> Result<PackManifest, RunError> {
    fs::create_dir_all(dir)?;
    let mut copies: Vec<(PathBuf, String)> = vec![
        (contents.sealed.clone(), file_name(&contents.sealed)?),
        (contents.manifest.clone(), file_name(&contents.manifest)?),
    ];
    for sig in &contents.signatures {
        copies.push((sig.clone(), file_name(sig)?));
    }
    let renamed = [
        (&contents.transparency_log, PACK_TRANSPARENCY_FILE),
        (&contents.authority_ledger, PACK_AUTHORITY_FILE),
        (&contents.abp, ABP_FILE),
    ];
    for (source, name) in renamed {
        if let Some(path) = source.as_ref().filter(|p| p.is_file()) {
            copies.push((path.clone(), name.to_string()));
        }
    }

    let mut files = BTreeMap::new();
    for (source, name) in copies {
        let target = dir.join(&name);
        fs::copy(&source, &target)?;
        files.insert(name, sha256_file(&target)?.to_string());
    }

    let sealed_name = file_name(&contents.sealed)?;
    let instructions_path = dir.join(INSTRUCTIONS_FILE);
    atomic_write(
        &instructions_path,
        instructions(run_id, &sealed_name, !contents.signatures.is_empty()).as_bytes(),
    )?;
    files.insert(
        INSTRUCTIONS_FILE.to_string(),
        sha256_file(&instructions_path)?.to_string(),
    );

    let manifest = PackManifest {
        pack_version: PACK_VERSION.to_string(),
        run_id: run_id.to_string(),
        commit_hash: commit_hash.to_string(),
        files,
    };
    write_json_atomic(&dir.join(PACK_MANIFEST_FILE), &manifest)?;
    tracing::info!(%run_id, pack = %dir.display(), files = manifest.files.len(), "evidence pack assembled");
    Ok(manifest)
}

/// The sealed run in a pack: the first `*.json` that is not a signature,
/// manifest or ABP and carries an authority envelope.
pub fn find_sealed(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            name.ends_with(".json")
                && !name.ends_with(SIG_SUFFIX)
                && !name.ends_with(".manifest.json")
                && name != ABP_FILE
                && name != PACK_MANIFEST_FILE
        })
        .collect();
    candidates.sort();
    candidates.into_iter().find(|p| {
        fs::read_to_string(p)
            .ok()
            .and_then(|t| serde_json::from_str::<Value>(&t).ok())
            .is_some_and(|v| {
                v.get("schema_version").and_then(Value::as_str) == Some(SEALED_SCHEMA_VERSION)
                    && v.get("authority_envelope").is_some()
            })
    })
}

#[derive(Debug, Clone, Default)]
pub struct PackVerifyOptions {
    /// Verify signatures when set.
    pub keys: Option<KeyRing>,
    pub threshold: Option<usize>,
    /// Strict determinism audit.
    pub strict: bool,
    pub require_abp: bool,
    pub verify_at: Option<Timestamp>,
}

fn check_pack_manifest(report: &mut VerificationReport, dir: &Path) {
    let path = dir.join(PACK_MANIFEST_FILE);
    if !path.is_file() {
        report.pass("pack.manifest", "not present; file hashes unchecked");
        return;
    }
    let manifest: PackManifest = match seal_core::fsio::read_json(&path) {
        Ok(m) => m,
        Err(e) => {
            report.fail("pack.manifest", e.to_string(), Severity::Structural);
            return;
        }
    };
    report.pass("pack.manifest", format!("{} files listed", manifest.files.len()));
    for (name, expected) in &manifest.files {
        let check = format!("pack.file[{name}]");
        match sha256_file(&dir.join(name)) {
            Ok(actual) => {
                let actual = actual.to_string();
                report.record(
                    check,
                    &actual == expected,
                    format!("disk {actual}, listed {expected}"),
                    Severity::Hash,
                );
            }
            Err(e) => report.fail(check, e.to_string(), Severity::MissingFile),
        }
    }
}

/// Verify every artifact found in a pack directory.
pub fn verify_pack(dir: &Path, options: &PackVerifyOptions) -> VerificationReport {
    let mut report = VerificationReport::new();
    if !dir.is_dir() {
        report.fail("discovery.pack_dir", format!("not found: {}", dir.display()), Severity::MissingFile);
        return report;
    }
    let Some(sealed) = find_sealed(dir) else {
        report.fail("discovery.sealed_run", "no sealed run in pack", Severity::MissingFile);
        return report;
    };
    let sealed_name = sealed
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    report.pass("discovery.sealed_run", sealed_name.clone());

    let sig = dir.join(format!("{sealed_name}{SIG_SUFFIX}"));
    let has_sig = sig.is_file();
    let log = Some(dir.join(PACK_TRANSPARENCY_FILE)).filter(|p| p.is_file());
    let ledger_path = Some(dir.join(PACK_AUTHORITY_FILE)).filter(|p| p.is_file());
    let abp = Some(dir.join(ABP_FILE)).filter(|p| p.is_file());
    report.pass(
        "discovery.signature",
        if has_sig { "present" } else { "not present" },
    );
    report.pass(
        "discovery.transparency_log",
        if log.is_some() { "present" } else { "not present" },
    );
    report.pass(
        "discovery.authority_ledger",
        if ledger_path.is_some() { "present" } else { "not present" },
    );
    if options.require_abp {
        report.record(
            "discovery.abp",
            abp.is_some(),
            if abp.is_some() { "present" } else { "required but missing" },
            Severity::MissingFile,
        );
    } else {
        report.pass("discovery.abp", if abp.is_some() { "present" } else { "not present" });
    }

    check_pack_manifest(&mut report, dir);

    let replay_options = ReplayOptions {
        strict: false,
        root: None,
        signature: options
            .keys
            .clone()
            .filter(|_| has_sig)
            .map(|keys| SignatureCheck {
                keys,
                threshold: options.threshold,
                sig_path: None,
            }),
        transparency_log: log.clone(),
        authority_ledger: ledger_path.clone(),
        verify_at: options.verify_at,
    };
    report.absorb("replay", replay_file(&sealed, &replay_options));

    if let Some(keys) = &options.keys {
        let mut sigs: Vec<PathBuf> = fs::read_dir(dir)
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.to_string_lossy().ends_with(SIG_SUFFIX))
            .collect();
        sigs.sort();
        for sig_file in sigs {
            let sig_name = sig_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = dir.join(sig_name.trim_end_matches(SIG_SUFFIX));
            let check = format!("signature.verify[{sig_name}]");
            if !target.is_file() {
                report.fail(check, "signed file missing", Severity::MissingFile);
                continue;
            }
            match verify_artifact_file(&target, None, keys) {
                Ok(outcome) => report.record(
                    check,
                    outcome.valid,
                    format!("{}/{} valid", outcome.valid_count, outcome.required),
                    Severity::Other,
                ),
                Err(e) => {
                    report.fail(check, e.to_string(), Severity::Other);
                    false
                }
            };
        }
    }

    if let Some(log) = &log {
        report.absorb("log_chain", TransparencyLog::open(log).verify());
    }
    let ledger = ledger_path.as_ref().map(AuthorityLedger::open);
    if let Some(ledger) = &ledger {
        report.absorb("authority_ledger", ledger.verify());
    }
    if let Some(abp) = &abp {
        report.extend(verify_abp_file(
            abp,
            ledger.as_ref(),
            options.verify_at.unwrap_or_else(Timestamp::now),
        ));
    }

    match audit_file(&sealed, options.strict) {
        Ok(audit) => {
            report.record(
                "determinism.violations",
                audit.violations() == 0,
                format!("{} violations, {} warnings", audit.violations(), audit.warnings()),
                Severity::Other,
            );
            for check in audit.checks() {
                report.record(
                    format!("determinism.{}", check.name),
                    check.level != AuditLevel::Fail,
                    check.detail.clone(),
                    Severity::Other,
                );
            }
        }
        Err(e) => report.fail("determinism.audit", e.to_string(), Severity::Other),
    }

    tracing::info!(
        pack = %dir.display(),
        checks = report.len(),
        exit_code = report.exit_code(),
        "pack verified"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{Assembler, SealRequest};
    use crate::testutil::{clock, fixture};

    #[test]
    fn assembled_pack_verifies_and_detects_edits() {
        let (d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let pack_dir = d.path().join("pack");
        let manifest = assemble_pack(
            &pack_dir,
            &PackContents {
                sealed: out.sealed_path.clone(),
                manifest: out.manifest_path.clone(),
                ..PackContents::default()
            },
            out.sealed.run_id(),
            &out.sealed.commit_hash,
        )
        .unwrap();
        assert_eq!(manifest.files.len(), 3);
        assert!(pack_dir.join(INSTRUCTIONS_FILE).is_file());
        assert_eq!(find_sealed(&pack_dir), Some(pack_dir.join(out.sealed_path.file_name().unwrap())));

        let report = verify_pack(&pack_dir, &PackVerifyOptions::default());
        assert!(report.passed(), "{report}");

        fs::write(pack_dir.join(INSTRUCTIONS_FILE), "edited").unwrap();
        let report = verify_pack(&pack_dir, &PackVerifyOptions::default());
        assert!(!report.get("pack.file[VERIFY_INSTRUCTIONS.md]").unwrap().passed);
        assert_eq!(report.exit_code(), 3);
    }

    #[test]
    fn empty_directory_has_no_sealed_run() {
        let dir = tempfile::tempdir().unwrap();
        let report = verify_pack(dir.path(), &PackVerifyOptions::default());
        assert_eq!(report.exit_code(), 4);
        let missing = verify_pack(&dir.path().join("absent"), &PackVerifyOptions::default());
        assert!(!missing.get("discovery.pack_dir").unwrap().passed);
    }

    #[test]
    fn require_abp_fails_without_one() {
        let (d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let pack_dir = d.path().join("pack");
        assemble_pack(
            &pack_dir,
            &PackContents {
                sealed: out.sealed_path,
                manifest: out.manifest_path,
                ..PackContents::default()
            },
            "RUN-x",
            "sha256:x",
        )
        .unwrap();
        let opts = PackVerifyOptions {
            require_abp: true,
            ..PackVerifyOptions::default()
        };
        assert!(!verify_pack(&pack_dir, &opts).get("discovery.abp").unwrap().passed);
    }
}
