//! Durable file writes.
//!
//! Artifacts are written to a sibling temp file, flushed, and renamed over the
//! destination. A reader never observes a half-written sealed run, manifest,
//! checkpoint or head snapshot.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::SealError;

/// Temp path used while `path` is being replaced.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to `path` via temp file + fsync + rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), SealError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_path_for(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    tracing::trace!(path = %path.display(), bytes = bytes.len(), "atomic write");
    Ok(())
}

/// Pretty-print `value` as JSON with a trailing newline and write atomically.
pub fn write_json_atomic(path: &Path, value: &impl Serialize) -> Result<(), SealError> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    atomic_write(path, text.as_bytes())
}

/// Read and parse a JSON file, mapping a missing file to `NotFound`.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SealError> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SealError::NotFound(format!("file {}", path.display())),
        _ => SealError::Io(e),
    })?;
    Ok(serde_json::from_str(&text)?)
}
