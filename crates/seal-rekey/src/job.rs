//! # Resumable Re-encryption Job
//!
//! Rewrites every `*.ndjson` record file in a data directory from the
//! previous key to the current one.
//!
//! ## Commit protocol
//!
//! For each file, in name order:
//!
//! 1. Re-encrypt up to `batch_size` records and append them to
//!    `<file>.rekey.tmp`, fsynced.
//! 2. Save the checkpoint with the advanced cursor. This is the commit
//!    point for the batch.
//! 3. When the file is exhausted, rename the temp output over the source,
//!    then advance the cursor to the next file.
//!
//! On resume, temp output past the checkpoint's `line_offset` is discarded,
//! so a crash between steps 1 and 2 re-processes that batch exactly once. A
//! crash between the rename and the checkpoint leaves `line_offset` at the
//! end of a file whose temp output is gone, which is recognized as already
//! promoted. Records already sealed under the current key are copied
//! through unchanged.
//!
//! Offsets count non-empty lines.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::checkpoint::{Checkpoint, Cursor, JobStatus};
use crate::cipher::{EncryptedRecord, RecordKey};
use crate::error::RekeyError;

pub const RECORD_EXTENSION: &str = "ndjson";
pub const TEMP_SUFFIX: &str = ".rekey.tmp";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_CHECKPOINT: &str = "artifacts/checkpoints/reencrypt_checkpoint.json";

/// The key being retired and the key replacing it.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub previous: RecordKey,
    pub current: RecordKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RekeySummary {
    pub tenant_id: String,
    pub dry_run: bool,
    pub resumed: bool,
    pub checkpoint_path: PathBuf,
    pub files_targeted: usize,
    pub records_targeted: usize,
    pub files_rewritten: usize,
    pub records_reencrypted: usize,
    pub status: JobStatus,
}

#[derive(Debug, Clone)]
pub struct RekeyJob {
    tenant_id: String,
    data_dir: PathBuf,
    checkpoint_path: PathBuf,
    idempotency_key: String,
    batch_size: usize,
}

fn record_lines(path: &Path) -> Result<Vec<String>, RekeyError> {
    Ok(fs::read_to_string(path)?
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect())
}

fn temp_path(source: &Path) -> PathBuf {
    let mut name = source
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    source.with_file_name(name)
}

impl RekeyJob {
    pub fn new(
        tenant_id: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        checkpoint_path: impl Into<PathBuf>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            data_dir: data_dir.into(),
            checkpoint_path: checkpoint_path.into(),
            idempotency_key: idempotency_key.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    fn validate(&self) -> Result<(), RekeyError> {
        if self.tenant_id.trim().is_empty() {
            return Err(RekeyError::Config("tenant_id is required".into()));
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(RekeyError::Config("idempotency key is required".into()));
        }
        if self.batch_size == 0 {
            return Err(RekeyError::Config("batch size must be > 0".into()));
        }
        if !self.data_dir.is_dir() {
            return Err(RekeyError::Config(format!(
                "data directory {} not found",
                self.data_dir.display()
            )));
        }
        Ok(())
    }

    /// Record files in name order, excluding temp output.
    pub fn targets(&self) -> Result<Vec<PathBuf>, RekeyError> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.data_dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn fresh_checkpoint(&self, status: JobStatus) -> Result<Checkpoint, RekeyError> {
        let targets = self.targets()?;
        let mut cp = Checkpoint::new(&self.tenant_id, &self.idempotency_key, status);
        cp.files_targeted = targets.len();
        for file in &targets {
            cp.records_targeted += record_lines(file)?.len();
        }
        cp.cursor = targets.first().map(|f| Cursor {
            file: Self::file_name(f),
            line_offset: 0,
        });
        Ok(cp)
    }

    fn summary(&self, cp: &Checkpoint, resumed: bool) -> RekeySummary {
        RekeySummary {
            tenant_id: cp.tenant_id.clone(),
            dry_run: cp.status == JobStatus::DryRun,
            resumed,
            checkpoint_path: self.checkpoint_path.clone(),
            files_targeted: cp.files_targeted,
            records_targeted: cp.records_targeted,
            files_rewritten: cp.files_rewritten,
            records_reencrypted: cp.records_reencrypted,
            status: cp.status,
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> RekeyError {
        RekeyError::CheckpointCorrupt {
            path: self.checkpoint_path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Count targets and write a `dry_run` checkpoint. Refuses to overwrite
    /// the checkpoint of a job in progress.
    pub fn dry_run(&self) -> Result<RekeySummary, RekeyError> {
        self.validate()?;
        if let Some(existing) = Checkpoint::load(&self.checkpoint_path)? {
            if existing.status == JobStatus::Running {
                return Err(RekeyError::Config(format!(
                    "job {} is in progress; resume it before a dry run",
                    existing.idempotency_key
                )));
            }
        }
        let mut cp = self.fresh_checkpoint(JobStatus::DryRun)?;
        cp.cursor = None;
        cp.save(&self.checkpoint_path)?;
        tracing::info!(
            tenant_id = %self.tenant_id,
            files = cp.files_targeted,
            records = cp.records_targeted,
            "re-encryption dry run"
        );
        Ok(self.summary(&cp, false))
    }

    pub fn run(&self, rotation: &Rotation) -> Result<RekeySummary, RekeyError> {
        self.run_batches(rotation, None)
    }

    /// Run at most `max_batches` batches, then stop with status `running`.
    pub fn run_batches(
        &self,
        rotation: &Rotation,
        max_batches: Option<usize>,
    ) -> Result<RekeySummary, RekeyError> {
        self.validate()?;
        if rotation.previous.key_id() == rotation.current.key_id() {
            return Err(RekeyError::Config(format!(
                "previous and current key share id {}",
                rotation.current.key_id()
            )));
        }

        let (mut cp, resumed) = match Checkpoint::load(&self.checkpoint_path)? {
            Some(cp) if cp.status == JobStatus::DryRun => (self.fresh_checkpoint(JobStatus::Running)?, false),
            Some(cp) if cp.idempotency_key != self.idempotency_key => {
                return Err(RekeyError::IdempotencyMismatch {
                    path: self.checkpoint_path.display().to_string(),
                    checkpoint: cp.idempotency_key,
                    supplied: self.idempotency_key.clone(),
                });
            }
            Some(cp) if cp.tenant_id != self.tenant_id => {
                return Err(RekeyError::Config(format!(
                    "checkpoint belongs to tenant {}, not {}",
                    cp.tenant_id, self.tenant_id
                )));
            }
            Some(cp) if cp.status == JobStatus::Completed => {
                tracing::info!(idempotency_key = %self.idempotency_key, "re-encryption already completed");
                return Ok(self.summary(&cp, true));
            }
            Some(cp) => (cp, true),
            None => (self.fresh_checkpoint(JobStatus::Running)?, false),
        };
        if resumed {
            tracing::info!(
                idempotency_key = %self.idempotency_key,
                cursor = ?cp.cursor,
                "resuming re-encryption"
            );
        }
        cp.save(&self.checkpoint_path)?;

        let names: Vec<String> = self.targets()?.iter().map(|p| Self::file_name(p)).collect();
        let mut batches = 0usize;

        while let Some(cursor) = cp.cursor.clone() {
            let index = names
                .iter()
                .position(|n| *n == cursor.file)
                .ok_or_else(|| self.corrupt(format!("target {} no longer exists", cursor.file)))?;
            let source = self.data_dir.join(&cursor.file);
            let temp = temp_path(&source);
            let lines = record_lines(&source)?;
            let mut offset = cursor.line_offset;
            if offset > lines.len() {
                return Err(self.corrupt(format!(
                    "{} has {} records, cursor at {offset}",
                    cursor.file,
                    lines.len()
                )));
            }

            if offset == 0 {
                fs::File::create(&temp)?;
            } else if temp.exists() {
                self.discard_uncommitted(&temp, offset)?;
            } else if offset < lines.len() {
                return Err(self.corrupt(format!("temp output for {} is missing", cursor.file)));
            }

            while offset < lines.len() {
                let end = (offset + self.batch_size).min(lines.len());
                let mut out = String::new();
                let mut changed = 0usize;
                for (i, line) in lines[offset..end].iter().enumerate() {
                    let record: EncryptedRecord =
                        serde_json::from_str(line).map_err(|e| RekeyError::Record {
                            path: source.display().to_string(),
                            line: offset + i + 1,
                            reason: e.to_string(),
                        })?;
                    let record = if record.key_id == rotation.current.key_id() {
                        record
                    } else {
                        changed += 1;
                        record.reencrypt(&rotation.previous, &rotation.current)?
                    };
                    out.push_str(&serde_json::to_string(&record).map_err(seal_core::SealError::from)?);
                    out.push('\n');
                }
                {
                    let mut file = OpenOptions::new().append(true).open(&temp)?;
                    file.write_all(out.as_bytes())?;
                    file.sync_all()?;
                }
                offset = end;
                cp.cursor = Some(Cursor {
                    file: cursor.file.clone(),
                    line_offset: offset,
                });
                cp.temp_output = Some(Self::file_name(&temp));
                cp.records_reencrypted += changed;
                cp.save(&self.checkpoint_path)?;

                batches += 1;
                if max_batches.is_some_and(|max| batches >= max) {
                    tracing::info!(batches, cursor = ?cp.cursor, "re-encryption paused");
                    return Ok(self.summary(&cp, resumed));
                }
            }

            if temp.exists() {
                fs::rename(&temp, &source)?;
            }
            tracing::info!(file = %cursor.file, records = lines.len(), "record file promoted");
            cp.files_rewritten += 1;
            cp.temp_output = None;
            cp.cursor = names.get(index + 1).map(|next| Cursor {
                file: next.clone(),
                line_offset: 0,
            });
            if cp.cursor.is_none() {
                cp.status = JobStatus::Completed;
            }
            cp.save(&self.checkpoint_path)?;
        }

        if cp.status != JobStatus::Completed {
            cp.status = JobStatus::Completed;
            cp.save(&self.checkpoint_path)?;
        }
        tracing::info!(
            tenant_id = %cp.tenant_id,
            files = cp.files_rewritten,
            records = cp.records_reencrypted,
            "re-encryption completed"
        );
        Ok(self.summary(&cp, resumed))
    }

    /// Drop temp lines written after the last committed checkpoint.
    fn discard_uncommitted(&self, temp: &Path, committed: usize) -> Result<(), RekeyError> {
        let written = record_lines(temp)?;
        if written.len() < committed {
            return Err(self.corrupt(format!(
                "{} holds {} records, checkpoint committed {committed}",
                temp.display(),
                written.len()
            )));
        }
        if written.len() > committed {
            tracing::warn!(
                temp = %temp.display(),
                discarded = written.len() - committed,
                "discarding uncommitted re-encrypted records"
            );
            let mut keep = written[..committed].join("\n");
            keep.push('\n');
            seal_core::fsio::atomic_write(temp, keep.as_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::KEY_LEN;

    fn rotation() -> Rotation {
        Rotation {
            previous: RecordKey::new("k-old", [1u8; KEY_LEN]),
            current: RecordKey::new("k-new", [2u8; KEY_LEN]),
        }
    }

    fn plaintext(file: usize, i: usize) -> String {
        format!("{{\"file\":{file},\"claim\":{i}}}")
    }

    /// Two record files of 5 and 3 records under the previous key.
    fn store() -> (tempfile::TempDir, RekeyJob) {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        let old = rotation().previous;
        for (f, (name, n)) in [("a_claims.ndjson", 5), ("b_drift.ndjson", 3)].iter().enumerate() {
            let mut text = String::new();
            for i in 0..*n {
                let rec =
                    EncryptedRecord::seal(format!("{name}-{i}"), plaintext(f, i).as_bytes(), &old)
                        .unwrap();
                text.push_str(&serde_json::to_string(&rec).unwrap());
                text.push('\n');
            }
            fs::write(data.join(name), text).unwrap();
        }
        fs::write(data.join("notes.txt"), "ignored").unwrap();
        let job = RekeyJob::new("tenant-a", &data, dir.path().join("ckpt.json"), "idem-1").batch_size(2);
        (dir, job)
    }

    fn assert_all_current(job: &RekeyJob) {
        let current = rotation().current;
        for (f, path) in job.targets().unwrap().iter().enumerate() {
            let lines = record_lines(path).unwrap();
            for (i, line) in lines.iter().enumerate() {
                let rec: EncryptedRecord = serde_json::from_str(line).unwrap();
                assert_eq!(rec.key_id, "k-new");
                assert_eq!(&rec.open(&current).unwrap()[..], plaintext(f, i).as_bytes());
            }
            assert!(!temp_path(path).exists());
        }
    }

    #[test]
    fn full_run_rewrites_everything() {
        let (_d, job) = store();
        let summary = job.run(&rotation()).unwrap();
        assert_eq!(summary.status, JobStatus::Completed);
        assert_eq!(summary.files_targeted, 2);
        assert_eq!(summary.records_targeted, 8);
        assert_eq!(summary.files_rewritten, 2);
        assert_eq!(summary.records_reencrypted, 8);
        assert!(!summary.resumed);
        assert_all_current(&job);

        let cp = Checkpoint::load(job.checkpoint_path()).unwrap().unwrap();
        assert_eq!(cp.status, JobStatus::Completed);
        assert!(cp.cursor.is_none());
    }

    #[test]
    fn interrupted_run_resumes_without_double_processing() {
        let (_d, job) = store();
        let paused = job.run_batches(&rotation(), Some(2)).unwrap();
        assert_eq!(paused.status, JobStatus::Running);
        assert_eq!(paused.records_reencrypted, 4);
        let cp = Checkpoint::load(job.checkpoint_path()).unwrap().unwrap();
        assert_eq!(
            cp.cursor,
            Some(Cursor {
                file: "a_claims.ndjson".into(),
                line_offset: 4
            })
        );

        let done = job.run(&rotation()).unwrap();
        assert!(done.resumed);
        assert_eq!(done.records_reencrypted, 8);
        assert_eq!(done.files_rewritten, 2);
        assert_all_current(&job);
    }

    #[test]
    fn uncommitted_temp_output_is_discarded() {
        let (_d, job) = store();
        job.run_batches(&rotation(), Some(1)).unwrap();
        let source = job.targets().unwrap()[0].clone();
        let temp = temp_path(&source);
        // a batch written but never checkpointed
        let mut f = OpenOptions::new().append(true).open(&temp).unwrap();
        writeln!(f, "{{\"half\":\"written\"}}").unwrap();
        drop(f);

        let done = job.run(&rotation()).unwrap();
        assert_eq!(done.records_reencrypted, 8);
        assert_all_current(&job);
    }

    #[test]
    fn crash_after_promotion_is_recognized() {
        let (_d, job) = store();
        // pause exactly when the first file is fully written but not promoted
        job.run_batches(&rotation(), Some(3)).unwrap();
        let source = job.targets().unwrap()[0].clone();
        fs::rename(temp_path(&source), &source).unwrap();

        let done = job.run(&rotation()).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.files_rewritten, 2);
        assert_eq!(done.records_reencrypted, 8);
        assert_all_current(&job);
    }

    #[test]
    fn different_idempotency_key_is_fatal() {
        let (d, job) = store();
        job.run_batches(&rotation(), Some(1)).unwrap();
        let other = RekeyJob::new("tenant-a", d.path().join("data"), job.checkpoint_path(), "idem-2");
        assert!(matches!(
            other.run(&rotation()),
            Err(RekeyError::IdempotencyMismatch { .. })
        ));
    }

    #[test]
    fn completed_job_is_a_no_op_on_rerun() {
        let (_d, job) = store();
        job.run(&rotation()).unwrap();
        let before = fs::read(&job.targets().unwrap()[0]).unwrap();
        let again = job.run(&rotation()).unwrap();
        assert!(again.resumed);
        assert_eq!(again.status, JobStatus::Completed);
        assert_eq!(fs::read(&job.targets().unwrap()[0]).unwrap(), before);
    }

    #[test]
    fn dry_run_counts_and_touches_nothing() {
        let (_d, job) = store();
        let before = fs::read(&job.targets().unwrap()[0]).unwrap();
        let summary = job.dry_run().unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.status, JobStatus::DryRun);
        assert_eq!(summary.records_targeted, 8);
        assert_eq!(summary.records_reencrypted, 0);
        assert_eq!(fs::read(&job.targets().unwrap()[0]).unwrap(), before);

        job.run_batches(&rotation(), Some(1)).unwrap();
        assert!(matches!(job.dry_run(), Err(RekeyError::Config(_))));
    }

    #[test]
    fn records_already_current_pass_through() {
        let (_d, job) = store();
        let first = job.targets().unwrap()[0].clone();
        let mut lines = record_lines(&first).unwrap();
        let current = EncryptedRecord::seal("extra", b"{}", &rotation().current).unwrap();
        let current_line = serde_json::to_string(&current).unwrap();
        lines.push(current_line.clone());
        fs::write(&first, lines.join("\n") + "\n").unwrap();

        let summary = job.run(&rotation()).unwrap();
        assert_eq!(summary.records_targeted, 9);
        assert_eq!(summary.records_reencrypted, 8);
        assert!(record_lines(&first).unwrap().contains(&current_line));
    }

    #[test]
    fn wrong_previous_key_fails_closed() {
        let (_d, job) = store();
        let bad = Rotation {
            previous: RecordKey::new("k-old", [9u8; KEY_LEN]),
            current: rotation().current,
        };
        assert!(matches!(job.run(&bad), Err(RekeyError::Decrypt { .. })));
        let source = job.targets().unwrap()[0].clone();
        let rec: EncryptedRecord =
            serde_json::from_str(&record_lines(&source).unwrap()[0]).unwrap();
        assert_eq!(rec.key_id, "k-old");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn any_pause_point_resumes_to_the_same_result(batch in 1usize..6, pause in 1usize..8) {
                let (_d, job) = store();
                let job = job.batch_size(batch);
                job.run_batches(&rotation(), Some(pause)).unwrap();
                let done = job.run(&rotation()).unwrap();
                prop_assert_eq!(done.status, JobStatus::Completed);
                prop_assert_eq!(done.records_reencrypted, 8);
                prop_assert_eq!(done.files_rewritten, 2);
                assert_all_current(&job);
            }
        }
    }
}
