//! # Determinism Audit
//!
//! Checks that a sealed run could be reproduced byte for byte: fixed clock,
//! deterministic ids, no random UUIDs, volatile fields excluded, and a
//! content hash that re-serializes.
//!
//! Exit codes: 0 clean, 1 warnings only, 2 violations. Strict mode turns
//! every warning into a violation.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use seal_core::{det_id, ContentDigest, IdKind};

use crate::error::RunError;
use crate::sealed::compute_sealed_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCheck {
    pub name: String,
    pub level: AuditLevel,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    checks: Vec<AuditCheck>,
    #[serde(skip)]
    strict: bool,
}

impl AuditResult {
    fn push(&mut self, name: &str, level: AuditLevel, detail: impl Into<String>) {
        self.checks.push(AuditCheck {
            name: name.to_string(),
            level,
            detail: detail.into(),
        });
    }

    fn ok(&mut self, name: &str, detail: impl Into<String>) {
        self.push(name, AuditLevel::Ok, detail);
    }

    fn fail(&mut self, name: &str, detail: impl Into<String>) {
        self.push(name, AuditLevel::Fail, detail);
    }

    /// A warning, or a violation in strict mode.
    fn warn(&mut self, name: &str, detail: impl Into<String>) {
        let level = if self.strict {
            AuditLevel::Fail
        } else {
            AuditLevel::Warn
        };
        self.push(name, level, detail);
    }

    pub fn checks(&self) -> &[AuditCheck] {
        &self.checks
    }

    pub fn get(&self, name: &str) -> Option<&AuditCheck> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn warnings(&self) -> usize {
        self.count(AuditLevel::Warn)
    }

    pub fn violations(&self) -> usize {
        self.count(AuditLevel::Fail)
    }

    fn count(&self, level: AuditLevel) -> usize {
        self.checks.iter().filter(|c| c.level == level).count()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings() == 0 && self.violations() == 0
    }

    pub fn exit_code(&self) -> u8 {
        if self.violations() > 0 {
            2
        } else if self.warnings() > 0 {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let tag = match check.level {
                AuditLevel::Ok => "PASS",
                AuditLevel::Warn => "WARN",
                AuditLevel::Fail => "FAIL",
            };
            writeln!(f, "[{tag}] {}: {}", check.name, check.detail)?;
        }
        let verdict = match self.exit_code() {
            0 => "CLEAN",
            1 => "WARNINGS",
            _ => "VIOLATIONS",
        };
        write!(
            f,
            "{verdict}: {} checks, {} warnings, {} violations",
            self.checks.len(),
            self.warnings(),
            self.violations()
        )
    }
}

/// Random (version 4) UUIDs anywhere in `text`.
pub fn find_random_uuids(text: &str) -> Vec<uuid::Uuid> {
    const LEN: usize = 36;
    text.split(|c: char| !(c.is_ascii_hexdigit() || c == '-'))
        .filter(|token| token.len() >= LEN)
        .flat_map(|token| (0..=token.len() - LEN).map(move |i| &token[i..i + LEN]))
        .filter_map(|window| uuid::Uuid::try_parse(window).ok())
        .filter(|id| id.get_version() == Some(uuid::Version::Random))
        .collect()
}

/// Audit the raw text of a sealed run.
pub fn audit_text(raw: &str, strict: bool) -> AuditResult {
    let mut result = AuditResult {
        checks: Vec::new(),
        strict,
    };
    let sealed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            result.fail("sealed.json", e.to_string());
            return result;
        }
    };

    let Some(scope) = sealed.get("hash_scope") else {
        result.fail("hash_scope.present", "no hash_scope");
        return result;
    };
    result.ok("hash_scope.present", "hash_scope found");

    let clock = scope.pointer("/parameters/clock").and_then(Value::as_str);
    match clock {
        Some(c) => result.ok("hash_scope.clock_fixed", format!("clock={c}")),
        None => result.warn("hash_scope.clock_fixed", "clock is null"),
    }

    let deterministic = scope.pointer("/parameters/deterministic").and_then(Value::as_bool);
    if deterministic == Some(true) {
        result.ok("hash_scope.deterministic_flag", "deterministic=true");
    } else {
        result.warn(
            "hash_scope.deterministic_flag",
            format!("deterministic={deterministic:?}"),
        );
    }

    let excluded = scope
        .get("exclusions")
        .and_then(Value::as_array)
        .is_some_and(|list| list.iter().any(|e| e == "observed_at"));
    if excluded {
        result.ok("exclusions.observed_at", "observed_at excluded");
    } else {
        result.fail("exclusions.observed_at", "observed_at not in exclusion list");
    }

    let commit_hash = sealed.get("commit_hash").and_then(Value::as_str);
    let run_id = sealed
        .pointer("/authority_envelope/provenance/run_id")
        .and_then(Value::as_str);
    match (commit_hash.map(ContentDigest::parse), run_id) {
        (Some(Ok(commit)), Some(run_id)) => {
            let expected = det_id(IdKind::Run, &commit);
            if expected == run_id {
                result.ok("ids.run_id_deterministic", format!("run_id={run_id}"));
            } else {
                result.fail(
                    "ids.run_id_deterministic",
                    format!("run_id={run_id}, expected {expected}"),
                );
            }
        }
        (Some(Err(e)), _) => result.fail("ids.run_id_deterministic", e.to_string()),
        _ => result.warn("ids.run_id_deterministic", "missing commit_hash or run_id"),
    }

    let uuids = find_random_uuids(raw);
    if uuids.is_empty() {
        result.ok("ids.no_uuid", "no random UUIDs");
    } else {
        result.fail("ids.no_uuid", format!("{} random UUID(s), first {}", uuids.len(), uuids[0]));
    }

    if let Some(clock) = clock {
        let committed_at = sealed
            .pointer("/authority_envelope/provenance/created_at")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if committed_at == clock {
            result.ok("timestamps.committed_at_matches_clock", format!("committed_at={committed_at}"));
        } else {
            result.warn(
                "timestamps.committed_at_matches_clock",
                format!("committed_at={committed_at}, clock={clock}"),
            );
        }
    }

    if sealed.get("inputs_commitments").is_some() {
        result.ok("commitments.present", "inputs_commitments found");
    } else {
        result.warn("commitments.present", "no inputs_commitments");
    }

    let recorded = sealed.get("hash").and_then(Value::as_str).unwrap_or_default();
    match compute_sealed_hash(&sealed) {
        Ok(computed) if computed == recorded => {
            result.ok("canonical.json_valid", "re-serialization hash matches")
        }
        Ok(computed) => result.fail(
            "canonical.json_valid",
            format!("computed {computed}, recorded {recorded}"),
        ),
        Err(e) => result.fail("canonical.json_valid", e.to_string()),
    }

    result
}

pub fn audit_file(path: &Path, strict: bool) -> Result<AuditResult, RunError> {
    let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RunError::MissingInput(path.display().to_string()),
        _ => RunError::Io(e),
    })?;
    let result = audit_text(&raw, strict);
    tracing::debug!(
        path = %path.display(),
        warnings = result.warnings(),
        violations = result.violations(),
        "determinism audit finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{Assembler, SealRequest};
    use crate::testutil::{clock, fixture};

    #[test]
    fn clock_sealed_run_is_clean_even_strict() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let result = audit_file(&out.sealed_path, true).unwrap();
        assert!(result.is_clean(), "{result}");
        assert_eq!(result.checks().len(), 9);
    }

    #[test]
    fn wall_clock_run_warns_and_strict_violates() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg).seal(&SealRequest::new("DEC-001")).unwrap();
        let lenient = audit_file(&out.sealed_path, false).unwrap();
        assert_eq!(lenient.exit_code(), 1);
        assert_eq!(lenient.get("hash_scope.clock_fixed").unwrap().level, AuditLevel::Warn);
        assert_eq!(audit_file(&out.sealed_path, true).unwrap().exit_code(), 2);
    }

    #[test]
    fn random_uuid_is_a_violation() {
        let (_d, cfg) = fixture();
        let out = Assembler::new(&cfg)
            .seal(&SealRequest::new("DEC-001").clock(clock()))
            .unwrap();
        let mut v: Value =
            serde_json::from_str(&std::fs::read_to_string(&out.sealed_path).unwrap()).unwrap();
        v["outputs"]["top_risks"] = serde_json::json!([uuid::Uuid::new_v4().to_string()]);
        let result = audit_text(&v.to_string(), false);
        assert_eq!(result.get("ids.no_uuid").unwrap().level, AuditLevel::Fail);
        assert_eq!(result.exit_code(), 2);
    }

    #[test]
    fn hex_digests_are_not_uuids() {
        let text = format!("\"sha256:{}\"", "0123456789abcdef".repeat(4));
        assert!(find_random_uuids(&text).is_empty());
        let v4 = "123e4567-e89b-42d3-a456-426614174000";
        assert_eq!(find_random_uuids(&format!("x{v4}y")).len(), 1);
    }

    #[test]
    fn missing_scope_stops_early() {
        let result = audit_text(r#"{"hash": ""}"#, false);
        assert_eq!(result.checks().len(), 1);
        assert_eq!(result.exit_code(), 2);
    }
}
