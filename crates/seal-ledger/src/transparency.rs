//! # Transparency Log
//!
//! Append-only, hash-chained registry of sealed runs keyed by
//! `commit_hash`. Independent of the authority ledger: a verifier can check
//! that an artifact was published without trusting the ledger that
//! authorized it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use seal_core::{det_id_of, sha256_raw, IdKind, Severity, Timestamp, VerificationReport};

use crate::chain::{append_chained, compute_entry_hash, verify_chain, Chained};
use crate::error::LedgerError;
use crate::store::NdjsonStore;

pub const LOG_ENTRY_VERSION: &str = "1.0";
pub const LOG_HEAD_VERSION: &str = "1.0";
pub const LOG_HEAD_FILE: &str = "LOG_HEAD.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub entry_version: String,
    pub entry_id: String,
    pub run_id: String,
    pub commit_hash: String,
    /// Content hash of the sealed run this entry attests to.
    pub artifact_bytes_sha256: String,
    pub artifact_path: Option<String>,
    pub signing_key_id: Option<String>,
    pub witness_key_id: Option<String>,
}

pub type LogEntry = Chained<LogRecord>;

/// Parameters of a new log entry.
#[derive(Debug, Clone, Default)]
pub struct LogAppend {
    pub run_id: String,
    pub commit_hash: String,
    pub sealed_hash: String,
    pub signing_key_id: Option<String>,
    pub witness_key_id: Option<String>,
    pub artifact_path: Option<String>,
}

/// Snapshot of the log for external anchoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHead {
    pub head_version: String,
    pub entry_count: usize,
    pub latest_entry_id: Option<String>,
    pub latest_entry_hash: Option<String>,
    /// `sha256` of the raw log file text.
    pub chain_head_hash: Option<String>,
    pub generated_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct TransparencyLog {
    store: NdjsonStore,
}

impl TransparencyLog {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            store: NdjsonStore::new(path.as_ref()),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    pub fn append(&self, request: LogAppend) -> Result<LogEntry, LedgerError> {
        for (field, value) in [
            ("run_id", &request.run_id),
            ("commit_hash", &request.commit_hash),
            ("sealed_hash", &request.sealed_hash),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::InvalidEntry(format!("{field} is required")));
            }
        }
        let entry_id = det_id_of(
            IdKind::TransparencyEntry,
            &serde_json::json!({
                "run_id": request.run_id,
                "commit_hash": request.commit_hash,
                "sealed_hash": request.sealed_hash,
            }),
        )?;
        let record = LogRecord {
            entry_version: LOG_ENTRY_VERSION.to_string(),
            entry_id,
            run_id: request.run_id,
            commit_hash: request.commit_hash,
            artifact_bytes_sha256: request.sealed_hash,
            artifact_path: request.artifact_path,
            signing_key_id: request.signing_key_id,
            witness_key_id: request.witness_key_id,
        };
        let entry = append_chained(&self.store, Some(Timestamp::now()), |_| Ok(record))?;
        tracing::info!(
            entry_id = %entry.body.entry_id,
            run_id = %entry.body.run_id,
            commit_hash = %entry.body.commit_hash,
            "transparency log entry appended"
        );
        Ok(entry)
    }

    pub fn entries(&self) -> Result<Vec<LogEntry>, LedgerError> {
        self.store.read_all()
    }

    /// Latest raw entry whose `commit_hash` matches, by linear scan.
    pub fn find_by_commit_hash(&self, commit_hash: &str) -> Result<Option<Value>, LedgerError> {
        Ok(self
            .store
            .read_values()?
            .into_iter()
            .rev()
            .find(|v| v.get("commit_hash").and_then(Value::as_str) == Some(commit_hash)))
    }

    pub fn verify(&self) -> VerificationReport {
        verify_chain(&self.store)
    }

    /// Snapshot of the current log state.
    pub fn head(&self) -> Result<LogHead, LedgerError> {
        let generated_at = Timestamp::now();
        let text = match std::fs::read_to_string(self.store.path()) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let values = self.store.read_values()?;
        let Some(last) = values.last() else {
            return Ok(LogHead {
                head_version: LOG_HEAD_VERSION.to_string(),
                entry_count: 0,
                latest_entry_id: None,
                latest_entry_hash: None,
                chain_head_hash: None,
                generated_at,
            });
        };
        let field = |k: &str| last.get(k).and_then(Value::as_str).map(str::to_string);
        Ok(LogHead {
            head_version: LOG_HEAD_VERSION.to_string(),
            entry_count: values.len(),
            latest_entry_id: field("entry_id"),
            latest_entry_hash: field("entry_hash"),
            chain_head_hash: Some(sha256_raw(text.as_bytes()).to_string()),
            generated_at,
        })
    }

    /// Write the head snapshot, by default to `LOG_HEAD.json` beside the log.
    pub fn write_head(&self, out: Option<&Path>) -> Result<(PathBuf, LogHead), LedgerError> {
        let head = self.head()?;
        let path = match out {
            Some(p) => p.to_path_buf(),
            None => self
                .store
                .path()
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(LOG_HEAD_FILE),
        };
        seal_core::fsio::write_json_atomic(&path, &head)?;
        Ok((path, head))
    }
}

/// Check one raw log entry against the sealed run it attests to.
///
/// The entry's own hash and its `artifact_bytes_sha256` binding are separate
/// checks: the first failing means the log was altered, the second that the
/// artifact (or the entry's claim about it) was.
pub fn verify_entry(entry: &Value, sealed_hash: &str) -> VerificationReport {
    let mut report = VerificationReport::new();
    let recorded = entry
        .get("entry_hash")
        .and_then(Value::as_str)
        .unwrap_or_default();
    match compute_entry_hash(entry) {
        Ok(computed) => {
            report.record(
                "entry_hash",
                computed == recorded,
                if computed == recorded {
                    format!("entry hash valid ({recorded})")
                } else {
                    format!("computed {computed} != recorded {recorded}")
                },
                Severity::Hash,
            );
        }
        Err(e) => report.fail("entry_hash", e.to_string(), Severity::Structural),
    }
    let attested = entry
        .get("artifact_bytes_sha256")
        .and_then(Value::as_str)
        .unwrap_or_default();
    report.record(
        "artifact_bytes",
        attested == sealed_hash,
        if attested == sealed_hash {
            format!("artifact hash matches ({sealed_hash})")
        } else {
            format!("log attests {attested}, sealed run has {sealed_hash}")
        },
        Severity::Hash,
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> (tempfile::TempDir, TransparencyLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = TransparencyLog::open(dir.path().join("log").join("log.ndjson"));
        (dir, log)
    }

    fn req(run: &str, commit: &str, sealed: &str) -> LogAppend {
        LogAppend {
            run_id: run.into(),
            commit_hash: commit.into(),
            sealed_hash: sealed.into(),
            signing_key_id: Some("ds-dev".into()),
            ..LogAppend::default()
        }
    }

    #[test]
    fn append_and_find() {
        let (_d, log) = log();
        let a = log.append(req("RUN-1", "sha256:aa", "sha256:s1")).unwrap();
        let b = log.append(req("RUN-2", "sha256:bb", "sha256:s2")).unwrap();
        assert!(a.body.entry_id.starts_with("TLE-"));
        assert_eq!(b.prev_entry_hash.as_deref(), Some(a.entry_hash.as_str()));
        let found = log.find_by_commit_hash("sha256:bb").unwrap().unwrap();
        assert_eq!(found["run_id"], "RUN-2");
        assert!(log.find_by_commit_hash("sha256:cc").unwrap().is_none());
        assert!(log.verify().passed());
    }

    #[test]
    fn missing_fields_rejected() {
        let (_d, log) = log();
        assert!(log.append(req("RUN-1", "", "sha256:s")).is_err());
    }

    #[test]
    fn verify_entry_reports_both_conditions_distinctly() {
        let (_d, log) = log();
        log.append(req("RUN-1", "sha256:aa", "sha256:s1")).unwrap();
        let entry = log.find_by_commit_hash("sha256:aa").unwrap().unwrap();

        let ok = verify_entry(&entry, "sha256:s1");
        assert!(ok.passed());

        let wrong_artifact = verify_entry(&entry, "sha256:other");
        assert!(wrong_artifact.get("entry_hash").unwrap().passed);
        assert!(!wrong_artifact.get("artifact_bytes").unwrap().passed);

        let mut forged = entry.clone();
        forged["artifact_bytes_sha256"] = "sha256:other".into();
        let forged_report = verify_entry(&forged, "sha256:other");
        assert!(!forged_report.get("entry_hash").unwrap().passed);
        assert!(forged_report.get("artifact_bytes").unwrap().passed);
        assert_eq!(forged_report.exit_code(), 3);
    }

    #[test]
    fn head_of_empty_and_populated_log() {
        let (_d, log) = log();
        let empty = log.head().unwrap();
        assert_eq!(empty.entry_count, 0);
        assert!(empty.chain_head_hash.is_none());

        let e = log.append(req("RUN-1", "sha256:aa", "sha256:s1")).unwrap();
        let (path, head) = log.write_head(None).unwrap();
        assert!(path.ends_with(LOG_HEAD_FILE));
        assert_eq!(head.entry_count, 1);
        assert_eq!(head.latest_entry_id.as_deref(), Some(e.body.entry_id.as_str()));
        assert_eq!(head.latest_entry_hash.as_deref(), Some(e.entry_hash.as_str()));
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            head.chain_head_hash.unwrap(),
            sha256_raw(text.as_bytes()).to_string()
        );
    }
}
