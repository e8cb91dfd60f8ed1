//! # Append-Only Record Store
//!
//! One JSON record per line (NDJSON). A file whose content is a single JSON
//! array is also accepted; appends to it rewrite the array atomically.
//!
//! ## Single Writer
//!
//! Appending is read-last → build-next → write, so concurrent writers would
//! fork the hash chain. Every append therefore holds:
//!
//! 1. an in-process `parking_lot::Mutex`, serializing threads, and
//! 2. an advisory `<ledger>.lock` file created with `create_new`, serializing
//!    processes. A held lock is waited on up to the store's timeout, then
//!    reported as [`LedgerError::LockTimeout`].
//!
//! Lines are written whole with a single `write_all` and synced before the
//! lock is released.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LedgerError;

static APPEND_GUARD: Mutex<()> = parking_lot::const_mutex(());

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// One record as read from disk, with its 1-based line number.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub line: usize,
    pub text: String,
}

/// Path-backed NDJSON store.
#[derive(Debug, Clone)]
pub struct NdjsonStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl NdjsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read_text(&self) -> Result<Option<String>, LedgerError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Records in file order. A missing file is an empty ledger.
    pub fn read_raw(&self) -> Result<Vec<RawRecord>, LedgerError> {
        let Some(text) = self.read_text()? else {
            return Ok(Vec::new());
        };
        let trimmed = text.trim_start();
        if trimmed.starts_with('[') {
            let items: Vec<Value> = serde_json::from_str(trimmed).map_err(|e| {
                LedgerError::Corrupt {
                    path: self.path.display().to_string(),
                    line: 1,
                    reason: e.to_string(),
                }
            })?;
            return items
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    Ok(RawRecord {
                        line: i + 1,
                        text: serde_json::to_string(v)?,
                    })
                })
                .collect();
        }
        Ok(text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| RawRecord {
                line: i + 1,
                text: l.trim().to_string(),
            })
            .collect())
    }

    /// Every record parsed as JSON.
    pub fn read_values(&self) -> Result<Vec<Value>, LedgerError> {
        self.read_raw()?
            .into_iter()
            .map(|r| {
                serde_json::from_str(&r.text).map_err(|e| LedgerError::Corrupt {
                    path: self.path.display().to_string(),
                    line: r.line,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Every record deserialized as `T`.
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, LedgerError> {
        self.read_raw()?
            .into_iter()
            .map(|r| {
                serde_json::from_str(&r.text).map_err(|e| LedgerError::Corrupt {
                    path: self.path.display().to_string(),
                    line: r.line,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Append one record computed from the current last record, under the
    /// writer lock.
    pub fn append_with<F>(&self, build: F) -> Result<Value, LedgerError>
    where
        F: FnOnce(Option<&Value>) -> Result<Value, LedgerError>,
    {
        let _thread_guard = APPEND_GUARD.lock();
        let _file_guard = WriterLock::acquire(&self.path, self.lock_timeout)?;

        let mut existing = self.read_values()?;
        let record = build(existing.last())?;

        let text = self.read_text()?;
        let is_array = text
            .as_deref()
            .is_some_and(|t| t.trim_start().starts_with('['));
        if is_array {
            existing.push(record.clone());
            seal_core::fsio::write_json_atomic(&self.path, &existing)?;
        } else {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let mut line = String::new();
            if text.as_deref().is_some_and(|t| !t.is_empty() && !t.ends_with('\n')) {
                line.push('\n');
            }
            line.push_str(&serde_json::to_string(&record)?);
            line.push('\n');
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(line.as_bytes())?;
            file.sync_all()?;
        }
        Ok(record)
    }
}

/// Advisory cross-process lock, removed on drop.
struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    fn lock_path(ledger: &Path) -> PathBuf {
        let mut name = ledger
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        ledger.with_file_name(name)
    }

    fn acquire(ledger: &Path, timeout: Duration) -> Result<Self, LedgerError> {
        let path = Self::lock_path(ledger);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    let _ = writeln!(f, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(LedgerError::LockTimeout(ledger.display().to_string()));
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release ledger lock");
        }
    }
}
