//! End-to-end sealing scenarios against throwaway workspaces.

use std::fs;
use std::path::Path;

use proptest::prelude::*;
use seal_core::Timestamp;
use seal_crypto::{
    append_signature, sign_artifact, verify_artifact_file, Ed25519KeyPair, Ed25519Signer, KeyRing,
    SignerIdentity, VerifyKey,
};
use seal_ledger::{AuthorityLedger, GrantRequest, ScopeBound};
use seal_run::{replay_file, replay_value, Assembler, ReplayOptions, SealConfig, SealRequest, SignatureCheck};

fn ts(s: &str) -> Timestamp {
    Timestamp::parse(s).unwrap()
}

fn clock() -> Timestamp {
    ts("2026-02-21T00:00:00Z")
}

fn put(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn workspace(risks: &str) -> (tempfile::TempDir, SealConfig) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    put(
        root,
        "artifacts/sample_data/decision_log.csv",
        "DecisionID,Title,Status,Confidence_pct\nDEC-001,Expand pilot,Approved,87.5\n",
    );
    put(root, "artifacts/sample_data/risks.csv", risks);
    put(root, "prompts/triage.md", "# Triage\nRank the risks.\n");
    put(root, "schemas/sealed_run.schema.json", "{\"type\": \"object\"}\n");
    put(root, "docs/governance/POLICY_BASELINE.md", "# Baseline\n");
    put(root, "docs/governance/POLICY_VERSION.txt", "GOV-2.1\n");
    let config = SealConfig::rooted(root);
    (dir, config)
}

const RISKS: &str = "RiskID,Severity\nR-1,high\nR-2,low\n";

#[test]
fn identical_trees_seal_identically() {
    let (_a, cfg_a) = workspace(RISKS);
    let (_b, cfg_b) = workspace(RISKS);
    let request = SealRequest::new("DEC-001").clock(clock());
    let a = Assembler::new(&cfg_a).seal(&request).unwrap();
    let b = Assembler::new(&cfg_b).seal(&request).unwrap();

    assert_eq!(a.sealed.commit_hash, b.sealed.commit_hash);
    assert_eq!(a.sealed.hash, b.sealed.hash);
    assert_eq!(a.sealed.run_id(), b.sealed.run_id());
    assert_eq!(
        a.sealed_path.file_name(),
        b.sealed_path.file_name(),
        "file names derive from run id and clock"
    );
}

#[test]
fn tampered_input_fails_disk_check_only() {
    let (d, cfg) = workspace(RISKS);
    let out = Assembler::new(&cfg)
        .seal(&SealRequest::new("DEC-001").clock(clock()))
        .unwrap();
    put(d.path(), "artifacts/sample_data/risks.csv", "RiskID,Severity\nR-1,high\nR-2,lox\n");

    let report = replay_file(
        &out.sealed_path,
        &ReplayOptions {
            root: Some(d.path().to_path_buf()),
            ..ReplayOptions::default()
        },
    );
    assert_eq!(report.exit_code(), 3, "{report}");
    assert!(report.get("hash.integrity").unwrap().passed);
    assert!(report.get("sealed_run.keys").unwrap().passed);
    assert!(!report.get("disk.commit_hash").unwrap().passed);
    assert!(
        !report
            .get("disk.sha256[artifacts/sample_data/risks.csv]")
            .unwrap()
            .passed
    );

    let without_disk = replay_file(&out.sealed_path, &ReplayOptions::default());
    assert!(without_disk.passed(), "{without_disk}");
}

#[test]
fn revocation_after_sealing_flips_only_the_present_check() {
    let (_d, cfg) = workspace(RISKS);
    let ledger = AuthorityLedger::open(cfg.authority_ledger());
    let grant = ledger
        .append(
            GrantRequest::new("AUTH-001", "alice", "Operator", ts("2026-01-01T00:00:00Z")).scope(
                ScopeBound {
                    decisions: vec!["DEC-001".into()],
                    ..ScopeBound::default()
                },
            ),
        )
        .unwrap();
    let out = Assembler::new(&cfg)
        .seal(
            &SealRequest::new("DEC-001")
                .clock(clock())
                .authority(&ledger, &grant.body.entry_id),
        )
        .unwrap();
    let sealed_bytes = fs::read(&out.sealed_path).unwrap();
    let options = ReplayOptions {
        authority_ledger: Some(cfg.authority_ledger()),
        ..ReplayOptions::default()
    };
    assert!(replay_file(&out.sealed_path, &options).passed());

    ledger
        .revoke("AUTH-001", "role change", ts("2026-03-01T00:00:00Z"))
        .unwrap();

    let report = replay_file(&out.sealed_path, &options);
    assert!(report.get("authority.not_revoked_at_seal").unwrap().passed);
    assert!(!report.get("authority.not_revoked_now").unwrap().passed);
    assert!(report.get("hash.integrity").unwrap().passed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(fs::read(&out.sealed_path).unwrap(), sealed_bytes);

    let before_revocation = replay_file(
        &out.sealed_path,
        &ReplayOptions {
            verify_at: Some(ts("2026-02-28T00:00:00Z")),
            ..options
        },
    );
    assert!(before_revocation.passed(), "{before_revocation}");
}

#[test]
fn grant_window_is_checked_at_sealing_time() {
    let (_d, cfg) = workspace(RISKS);
    let ledger = AuthorityLedger::open(cfg.authority_ledger());
    let grant = ledger
        .append(
            GrantRequest::new("AUTH-002", "alice", "Operator", ts("2026-01-01T00:00:00Z"))
                .scope(ScopeBound {
                    decisions: vec!["DEC-001".into()],
                    ..ScopeBound::default()
                })
                .expires_at(ts("2026-03-01T00:00:00Z")),
        )
        .unwrap();
    let out = Assembler::new(&cfg)
        .seal(
            &SealRequest::new("DEC-001")
                .clock(clock())
                .authority(&ledger, &grant.body.entry_id),
        )
        .unwrap();
    let options = ReplayOptions {
        authority_ledger: Some(cfg.authority_ledger()),
        verify_at: Some(ts("2026-06-01T00:00:00Z")),
        ..ReplayOptions::default()
    };
    let report = replay_file(&out.sealed_path, &options);
    assert!(report.passed(), "{report}");
    assert!(report.get("authority.not_expired_at_seal").unwrap().passed);
    assert!(report.get("authority.ledger_chain").unwrap().passed);

    let mut sealed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out.sealed_path).unwrap()).unwrap();
    sealed["authority_envelope"]["provenance"]["created_at"] =
        serde_json::json!("2026-03-15T00:00:00Z");
    let late = replay_value(&sealed, Some(out.sealed_path.as_path()), &options);
    let expired = late.get("authority.not_expired_at_seal").unwrap();
    assert!(!expired.passed);
    assert!(expired.detail.contains("AUTH-002"), "{}", expired.detail);
}

#[test]
fn edited_authority_ledger_fails_replay() {
    let (_d, cfg) = workspace(RISKS);
    let ledger = AuthorityLedger::open(cfg.authority_ledger());
    let grant = ledger
        .append(
            GrantRequest::new("AUTH-003", "alice", "Operator", ts("2026-01-01T00:00:00Z")).scope(
                ScopeBound {
                    decisions: vec!["DEC-001".into()],
                    ..ScopeBound::default()
                },
            ),
        )
        .unwrap();
    let out = Assembler::new(&cfg)
        .seal(
            &SealRequest::new("DEC-001")
                .clock(clock())
                .authority(&ledger, &grant.body.entry_id),
        )
        .unwrap();

    let text = fs::read_to_string(cfg.authority_ledger()).unwrap();
    fs::write(cfg.authority_ledger(), text.replace("Operator", "Director")).unwrap();

    let report = replay_file(
        &out.sealed_path,
        &ReplayOptions {
            authority_ledger: Some(cfg.authority_ledger()),
            ..ReplayOptions::default()
        },
    );
    assert!(!report.get("authority.ledger_chain").unwrap().passed);
    assert_eq!(report.exit_code(), 3, "{report}");
}

#[test]
fn two_of_three_witnesses() {
    let (_d, cfg) = workspace(RISKS);
    let out = Assembler::new(&cfg)
        .seal(&SealRequest::new("DEC-001").clock(clock()))
        .unwrap();

    let key_id = |i: u8| format!("ed25519:w{i}");
    let pair = |i: u8| Ed25519KeyPair::from_seed(&[i; 32]);
    let keys = (1u8..=3).fold(KeyRing::new(), |ring, i| {
        ring.with_key(key_id(i), VerifyKey::Ed25519(pair(i).public_key()))
    });

    let first = Ed25519Signer::new(key_id(1), pair(1));
    let second = Ed25519Signer::new(key_id(2), pair(2));
    sign_artifact(&out.sealed_path, &first, &SignerIdentity::new("Boss", "operator"), clock())
        .unwrap();

    let one = verify_artifact_file(&out.sealed_path, Some(2), &keys).unwrap();
    assert!(!one.valid);
    assert_eq!(one.valid_count, 1);

    append_signature(&out.sealed_path, &second, &SignerIdentity::new("Audit", "witness"), clock())
        .unwrap();
    let two = verify_artifact_file(&out.sealed_path, Some(2), &keys).unwrap();
    assert!(two.valid, "{}", two.report);
    assert_eq!(two.valid_count, 2);
    let three = verify_artifact_file(&out.sealed_path, Some(3), &keys).unwrap();
    assert!(!three.valid);

    let signature = SignatureCheck {
        keys: keys.clone(),
        threshold: Some(2),
        sig_path: None,
    };
    let report = replay_file(
        &out.sealed_path,
        &ReplayOptions {
            signature: Some(signature),
            ..ReplayOptions::default()
        },
    );
    assert!(report.passed(), "{report}");

    // A second signature from an already-counted key is flagged.
    append_signature(&out.sealed_path, &second, &SignerIdentity::new("Audit", "witness"), clock())
        .unwrap();
    let repeated = verify_artifact_file(&out.sealed_path, Some(2), &keys).unwrap();
    assert_eq!(repeated.valid_count, 2);
    assert!(repeated.report.get("quorum").unwrap().passed);
    assert!(!repeated.report.get("distinct_keys").unwrap().passed);
    assert!(!repeated.valid);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn any_input_content_seals_and_replays(rows in prop::collection::vec("[A-Za-z0-9 ]{0,24}", 0..6)) {
        let mut risks = String::from("RiskID,Note\n");
        for (i, note) in rows.iter().enumerate() {
            risks.push_str(&format!("R-{i},{note}\n"));
        }
        let (d, cfg) = workspace(&risks);
        let request = SealRequest::new("DEC-001").clock(clock());
        let prepared = Assembler::new(&cfg).prepare(&request).unwrap();
        let out = Assembler::new(&cfg).seal(&request).unwrap();
        prop_assert_eq!(&prepared.sealed.commit_hash, &out.sealed.commit_hash);

        let report = replay_file(
            &out.sealed_path,
            &ReplayOptions {
                strict: true,
                root: Some(d.path().to_path_buf()),
                ..ReplayOptions::default()
            },
        );
        prop_assert!(report.passed(), "{}", report);
    }
}
