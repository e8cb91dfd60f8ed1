//! # ABP Verification
//!
//! Every check runs and is reported on its own; nothing is collapsed into a
//! single boolean. The document is checked as raw JSON so that fields a
//! typed reader would drop still count toward the hash.

use std::collections::HashSet;
use std::path::Path;

use serde_json::{json, Value};

use seal_core::{det_id_of, IdKind, Severity, Timestamp, VerificationReport};
use seal_ledger::AuthorityLedger;

use crate::build::{compute_abp_hash, overlap};
use crate::schema::schema_violations;

fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer).and_then(Value::as_str)
}

fn ids<'a>(v: &'a Value, pointer: &str, key: &str) -> Vec<&'a str> {
    v.pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get(key).and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Verify a parsed ABP. `ledger` enables the authority checks, evaluated
/// at `at`.
pub fn verify_abp(
    abp: &Value,
    ledger: Option<&AuthorityLedger>,
    at: Timestamp,
) -> VerificationReport {
    let mut report = VerificationReport::new();

    match schema_violations(abp) {
        Ok(v) if v.is_empty() => report.pass("schema_valid", "validates against abp_v1 schema"),
        Ok(v) => report.fail("schema_valid", v.join("; "), Severity::Structural),
        Err(e) => report.fail("schema_valid", e.to_string(), Severity::Other),
    }

    let recorded_id = str_at(abp, "/abp_id").unwrap_or_default();
    match (abp.get("scope"), abp.get("authority_ref"), abp.get("created_at")) {
        (Some(scope), Some(auth), Some(created)) => {
            let seed = json!({"scope": scope, "authority_ref": auth, "created_at": created});
            match det_id_of(IdKind::Abp, &seed) {
                Ok(expected) => {
                    let ok = expected == recorded_id;
                    report.record(
                        "id_deterministic",
                        ok,
                        if ok {
                            format!("abp_id verified ({recorded_id})")
                        } else {
                            format!("expected {expected}, recorded {recorded_id}")
                        },
                        Severity::Hash,
                    );
                }
                Err(e) => report.fail("id_deterministic", e.to_string(), Severity::Structural),
            }
        }
        _ => report.fail(
            "id_deterministic",
            "scope, authority_ref or created_at missing",
            Severity::Structural,
        ),
    }

    let recorded_hash = str_at(abp, "/hash").unwrap_or_default();
    match compute_abp_hash(abp) {
        Ok(computed) => {
            let ok = computed == recorded_hash;
            report.record(
                "hash_integrity",
                ok,
                if ok {
                    "content hash verified".to_string()
                } else {
                    format!("computed {computed} != recorded {recorded_hash}")
                },
                Severity::Hash,
            );
        }
        Err(e) => report.fail("hash_integrity", e.to_string(), Severity::Structural),
    }

    verify_authority(&mut report, abp, ledger, at);
    verify_composition(&mut report, abp);

    let objective_overlap = overlap(
        ids(abp, "/objectives/allowed", "id"),
        ids(abp, "/objectives/denied", "id"),
    );
    let tool_overlap = overlap(ids(abp, "/tools/allow", "name"), ids(abp, "/tools/deny", "name"));
    let clean = objective_overlap.is_empty() && tool_overlap.is_empty();
    report.record(
        "no_contradictions",
        clean,
        if clean {
            "no contradictions".to_string()
        } else {
            format!("objectives {objective_overlap:?}, tools {tool_overlap:?}")
        },
        Severity::Structural,
    );

    verify_delegation_review(&mut report, abp);
    report
}

fn verify_authority(
    report: &mut VerificationReport,
    abp: &Value,
    ledger: Option<&AuthorityLedger>,
    at: Timestamp,
) {
    let Some(ledger) = ledger else {
        report.pass("authority_ref.found", "no ledger provided, skipped");
        report.pass("authority_not_expired", "no ledger provided, skipped");
        return;
    };
    if !ledger.path().exists() {
        let detail = format!("ledger {} not found", ledger.path().display());
        report.fail("authority_ref.found", detail.clone(), Severity::MissingFile);
        report.fail("authority_not_expired", detail, Severity::MissingFile);
        return;
    }

    let entry_id = str_at(abp, "/authority_ref/authority_entry_id").unwrap_or_default();
    let entry_hash = str_at(abp, "/authority_ref/authority_entry_hash").unwrap_or_default();
    let entry = match ledger.find_entry(entry_id) {
        Ok(Some(e)) => e,
        Ok(None) => {
            report.fail(
                "authority_ref.found",
                format!("entry {entry_id} not found in ledger"),
                Severity::Other,
            );
            return;
        }
        Err(e) => {
            report.fail("authority_ref.found", e.to_string(), Severity::Structural);
            return;
        }
    };
    report.pass("authority_ref.found", format!("entry {entry_id} present"));

    let hash_ok = entry.entry_hash == entry_hash;
    report.record(
        "authority_ref.hash",
        hash_ok,
        if hash_ok {
            "authority entry hash matches".to_string()
        } else {
            format!("ledger has {}, ABP references {entry_hash}", entry.entry_hash)
        },
        Severity::Hash,
    );

    match ledger.revocation_of(&entry.body.authority_id, at) {
        Err(e) => report.fail(
            "authority_ref.not_revoked",
            format!("cannot read revocations: {e}"),
            Severity::Structural,
        ),
        Ok(Some(rev)) => report.fail(
            "authority_ref.not_revoked",
            format!(
                "{} revoked by {}: {}",
                entry.body.authority_id,
                rev.entry_id,
                rev.revocation_reason.unwrap_or_default()
            ),
            Severity::Other,
        ),
        Ok(None) => match entry.body.revoked_at {
            Some(revoked_at) => report.fail(
                "authority_ref.not_revoked",
                format!("entry {entry_id} carries revoked_at {revoked_at}"),
                Severity::Other,
            ),
            None => report.pass(
                "authority_ref.not_revoked",
                format!("{} not revoked at {at}", entry.body.authority_id),
            ),
        },
    }

    match str_at(abp, "/created_at").map(Timestamp::parse_lenient) {
        Some(Ok(created)) => {
            let in_window = entry.body.effective_at <= created
                && entry.body.expires_at.map_or(true, |exp| created <= exp);
            report.record(
                "authority_not_expired",
                in_window,
                if in_window {
                    "ABP created_at within authority window".to_string()
                } else {
                    format!("ABP created_at {created} outside authority window")
                },
                Severity::Other,
            );
        }
        _ => report.fail(
            "authority_not_expired",
            "created_at missing or unparseable",
            Severity::Structural,
        ),
    }
}

fn verify_composition(report: &mut VerificationReport, abp: &Value) {
    let parent_id = str_at(abp, "/composition/parent_abp_id");
    let parent_hash = str_at(abp, "/composition/parent_abp_hash");
    let children = ids(abp, "/composition/children", "abp_id");
    let unique: HashSet<&str> = children.iter().copied().collect();

    let (ok, detail) = match (parent_id, parent_hash) {
        (Some(_), None) => (false, "parent_abp_id set but parent_abp_hash missing".to_string()),
        (None, Some(_)) => (false, "parent_abp_hash set but parent_abp_id missing".to_string()),
        _ if unique.len() != children.len() => (false, "duplicate child ABP ids".to_string()),
        (Some(pid), Some(_)) => (true, format!("parent={pid}, {} children", children.len())),
        (None, None) => (true, format!("{} children", children.len())),
    };
    report.record("composition_valid", ok, detail, Severity::Structural);
}

fn verify_delegation_review(report: &mut VerificationReport, abp: &Value) {
    let Some(review) = abp.get("delegation_review").filter(|v| !v.is_null()) else {
        report.pass("delegation_review_valid", "not present (optional section)");
        return;
    };
    let triggers = review
        .get("triggers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let trigger_ids: Vec<&str> = triggers
        .iter()
        .map(|t| t.get("id").and_then(Value::as_str).unwrap_or_default())
        .collect();
    let unique: HashSet<&str> = trigger_ids.iter().copied().collect();
    let severities_ok = triggers.iter().all(|t| {
        matches!(
            t.get("severity").and_then(Value::as_str),
            Some("warn") | Some("critical")
        )
    });
    let policy = review.get("review_policy");
    let has_policy = policy.is_some_and(|p| {
        str_at(p, "/approver_role").is_some_and(|s| !s.is_empty())
            && str_at(p, "/output").is_some_and(|s| !s.is_empty())
    });

    let (ok, detail) = if unique.len() != trigger_ids.len() {
        (false, "duplicate trigger ids".to_string())
    } else if !severities_ok {
        (false, "trigger severity must be warn or critical".to_string())
    } else if !has_policy {
        (false, "review_policy missing approver_role or output".to_string())
    } else {
        (true, format!("{} triggers", triggers.len()))
    };
    report.record("delegation_review_valid", ok, detail, Severity::Structural);
}

/// Read and verify an ABP file. A missing file or invalid JSON stops
/// verification.
pub fn verify_abp_file(
    path: &Path,
    ledger: Option<&AuthorityLedger>,
    at: Timestamp,
) -> VerificationReport {
    let mut report = VerificationReport::new();
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            report.fail(
                "file_exists",
                format!("{}: {e}", path.display()),
                Severity::MissingFile,
            );
            return report;
        }
    };
    let abp: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            report.fail("json_valid", e.to_string(), Severity::Structural);
            return report;
        }
    };
    report.pass("json_valid", "valid JSON");
    report.absorb("abp", verify_abp(&abp, ledger, at));
    report
}
