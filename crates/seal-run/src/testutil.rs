use std::fs;
use std::path::Path;

use seal_core::Timestamp;

use crate::config::SealConfig;

pub const DECISION_LOG: &str = "DecisionID,Title,Status,Confidence_pct,PriorityScore\n\
DEC-001,Expand pilot,Approved,87.5,4.2\n\
DEC-002,Freeze hiring,Proposed,60,2\n";

pub fn clock() -> Timestamp {
    Timestamp::parse("2026-02-21T00:00:00Z").unwrap()
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// A workspace with a decision log, one more input, a prompt, a schema and
/// a policy baseline.
pub fn fixture() -> (tempfile::TempDir, SealConfig) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "artifacts/sample_data/decision_log.csv", DECISION_LOG);
    write(root, "artifacts/sample_data/risks.csv", "RiskID,Severity\nR-1,high\n");
    write(root, "prompts/triage.md", "# Triage\n");
    write(root, "schemas/sealed_run.schema.json", "{\"type\": \"object\"}\n");
    write(root, "docs/governance/POLICY_BASELINE.md", "# Baseline\n");
    write(root, "docs/governance/POLICY_VERSION.txt", "GOV-2.1\n");
    let cfg = SealConfig::rooted(root);
    (dir, cfg)
}
