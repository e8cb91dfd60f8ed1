//! Job checkpoint, rewritten atomically after every batch.

use std::path::Path;

use serde::{Deserialize, Serialize};

use seal_core::Timestamp;

use crate::error::RekeyError;

pub const JOB_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    DryRun,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::DryRun => "dry_run",
        }
    }
}

/// Position of the next unprocessed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// File name within the data directory.
    pub file: String,
    /// Source lines already committed to `temp_output`.
    pub line_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job_version: String,
    pub tenant_id: String,
    pub idempotency_key: String,
    pub status: JobStatus,
    pub updated_at: Timestamp,
    pub files_targeted: usize,
    pub records_targeted: usize,
    pub files_rewritten: usize,
    pub records_reencrypted: usize,
    pub cursor: Option<Cursor>,
    /// Temp file holding the current file's committed output.
    pub temp_output: Option<String>,
}

impl Checkpoint {
    pub fn new(
        tenant_id: impl Into<String>,
        idempotency_key: impl Into<String>,
        status: JobStatus,
    ) -> Self {
        Self {
            job_version: JOB_VERSION.to_string(),
            tenant_id: tenant_id.into(),
            idempotency_key: idempotency_key.into(),
            status,
            updated_at: Timestamp::now(),
            files_targeted: 0,
            records_targeted: 0,
            files_rewritten: 0,
            records_reencrypted: 0,
            cursor: None,
            temp_output: None,
        }
    }

    /// `None` when no checkpoint has been written yet.
    pub fn load(path: &Path) -> Result<Option<Self>, RekeyError> {
        if !path.exists() {
            return Ok(None);
        }
        seal_core::fsio::read_json(path)
            .map(Some)
            .map_err(|e| RekeyError::CheckpointCorrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    pub fn save(&mut self, path: &Path) -> Result<(), RekeyError> {
        self.updated_at = Timestamp::now();
        seal_core::fsio::write_json_atomic(path, self)?;
        tracing::debug!(
            path = %path.display(),
            status = self.status.as_str(),
            records = self.records_reencrypted,
            "checkpoint saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt/reencrypt.json");
        assert!(Checkpoint::load(&path).unwrap().is_none());

        let mut cp = Checkpoint::new("tenant-a", "idem-1", JobStatus::Running);
        cp.cursor = Some(Cursor {
            file: "claims.ndjson".into(),
            line_offset: 4,
        });
        cp.save(&path).unwrap();
        let back = Checkpoint::load(&path).unwrap().unwrap();
        assert_eq!(back, cp);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["status"], "running");
        assert_eq!(raw["cursor"]["line_offset"], 4);
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Checkpoint::load(&path),
            Err(RekeyError::CheckpointCorrupt { .. })
        ));
    }
}
