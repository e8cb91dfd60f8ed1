//! # Verification Reports
//!
//! Verification passes (replay, chain verification, multisig, ABP verify)
//! never return `Err` for a finding. They push a [`Check`] per property into a
//! [`VerificationReport`] and keep going, so an operator sees every problem in
//! one pass. The report's worst severity is the exit code used for gating.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure class of a check, ordered by exit code.
///
/// The worst severity of a report is the failed check with the highest
/// numeric code: a missing file (4) outranks a hash mismatch (3), which
/// outranks a structural failure (2), which outranks anything else (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Inadmissible for any other reason (signature, authority, transparency).
    Other,
    /// Schema or structural failure.
    Structural,
    /// Hash, commit or merkle mismatch.
    Hash,
    /// A referenced file is missing (strict mode).
    MissingFile,
}

impl Severity {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Other => 1,
            Self::Structural => 2,
            Self::Hash => 3,
            Self::MissingFile => 4,
        }
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.exit_code().cmp(&other.exit_code())
    }
}

/// One named check outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub detail: String,
    /// Severity contributed when the check failed. `None` for passes.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub severity: Option<Severity>,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{tag}] {}: {}", self.name, self.detail)
    }
}

/// Ordered list of checks with a worst-severity verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    checks: Vec<Check>,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.checks.push(Check {
            name: name.into(),
            passed: true,
            detail: detail.into(),
            severity: None,
        });
    }

    pub fn fail(&mut self, name: impl Into<String>, detail: impl Into<String>, severity: Severity) {
        self.checks.push(Check {
            name: name.into(),
            passed: false,
            detail: detail.into(),
            severity: Some(severity),
        });
    }

    /// Push a pass or a fail depending on `ok`. Returns `ok`.
    pub fn record(
        &mut self,
        name: impl Into<String>,
        ok: bool,
        detail: impl Into<String>,
        severity: Severity,
    ) -> bool {
        if ok {
            self.pass(name, detail);
        } else {
            self.fail(name, detail, severity);
        }
        ok
    }

    /// Append every check of `other`, prefixing names with `prefix.`.
    pub fn absorb(&mut self, prefix: &str, other: VerificationReport) {
        for mut check in other.checks {
            check.name = format!("{prefix}.{}", check.name);
            self.checks.push(check);
        }
    }

    /// Append every check of `other` unchanged.
    pub fn extend(&mut self, other: VerificationReport) {
        self.checks.extend(other.checks);
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn get(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Highest severity among failed checks, `None` when everything passed.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.checks.iter().filter_map(|c| c.severity).max()
    }

    /// 0 on pass, otherwise the worst severity's code.
    pub fn exit_code(&self) -> u8 {
        self.worst_severity().map_or(0, |s| s.exit_code())
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, check) in self.checks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{check}")?;
        }
        Ok(())
    }
}
