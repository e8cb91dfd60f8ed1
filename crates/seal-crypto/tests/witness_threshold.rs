//! Witness threshold: 2-of-3 signers over one sealed artifact.

use std::path::{Path, PathBuf};

use seal_core::Timestamp;
use seal_crypto::{
    append_signature, verify_artifact_file, Ed25519KeyPair, Ed25519Signer, HmacKey, HmacSigner,
    KeyRing, SignerIdentity, VerifyKey,
};
use serde_json::json;

fn clock() -> Timestamp {
    Timestamp::parse("2026-02-21T00:00:00Z").expect("clock")
}

fn sealed(dir: &Path) -> PathBuf {
    let path = dir.join("RUN-0a1b2c3d_20260221T000000Z.json");
    let body = json!({
        "schema_version": "1.0",
        "commit_hash": "sha256:4f2c",
        "decision_state": {"decision_id": "DEC-001"},
        "hash": "sha256:0000"
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&body).expect("json")).expect("write");
    path
}

fn keyring(witness_pk: &Ed25519KeyPair) -> KeyRing {
    KeyRing::new()
        .with_key(
            "op-2026",
            VerifyKey::Hmac(HmacKey::from_bytes(b"operator-secret".to_vec()).expect("key")),
        )
        .with_key("witness-a", VerifyKey::Ed25519(witness_pk.public_key()))
        .with_key(
            "witness-b",
            VerifyKey::Hmac(HmacKey::from_bytes(b"witness-b-secret".to_vec()).expect("key")),
        )
}

#[test]
fn two_of_three_threshold() {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifact = sealed(dir.path());
    let witness_a = Ed25519KeyPair::from_seed(&[42u8; 32]);
    let keys = keyring(&witness_a);

    let operator = HmacSigner::new(
        "op-2026",
        HmacKey::from_bytes(b"operator-secret".to_vec()).expect("key"),
    );
    append_signature(
        &artifact,
        &operator,
        &SignerIdentity::new("alice", "operator"),
        clock(),
    )
    .expect("sign");

    let one = verify_artifact_file(&artifact, Some(2), &keys).expect("verify");
    assert!(!one.valid);
    assert_eq!(one.valid_count, 1);
    assert_eq!(one.report.exit_code(), 1);

    let witness = Ed25519Signer::new("witness-a", Ed25519KeyPair::from_seed(&[42u8; 32]));
    append_signature(
        &artifact,
        &witness,
        &SignerIdentity::new("carol", "witness"),
        clock(),
    )
    .expect("witness");

    let two = verify_artifact_file(&artifact, Some(2), &keys).expect("verify");
    assert!(two.valid);
    assert_eq!(two.valid_count, 2);
    assert!(two.report.passed());
}

#[test]
fn invalid_witness_does_not_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifact = sealed(dir.path());
    let witness_a = Ed25519KeyPair::from_seed(&[42u8; 32]);
    let keys = keyring(&witness_a);

    let operator = HmacSigner::new(
        "op-2026",
        HmacKey::from_bytes(b"operator-secret".to_vec()).expect("key"),
    );
    let impostor = HmacSigner::new(
        "witness-b",
        HmacKey::from_bytes(b"not-the-witness-secret".to_vec()).expect("key"),
    );
    append_signature(&artifact, &operator, &SignerIdentity::default(), clock()).expect("sign");
    append_signature(&artifact, &impostor, &SignerIdentity::default(), clock()).expect("sign");

    let out = verify_artifact_file(&artifact, Some(2), &keys).expect("verify");
    assert!(!out.valid);
    assert_eq!(out.valid_count, 1);
    assert_eq!(out.report.failures().count(), 2);
}
