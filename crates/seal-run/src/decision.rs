//! Decision rows from `decision_log.csv`.
//!
//! Numeric columns are carried as their literal text. Sealed artifacts are
//! canonicalized without floats, so `Confidence_pct = 87.5` is sealed as the
//! string `"87.5"`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// The decision being sealed, as embedded in the sealed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionState {
    pub decision_id: String,
    pub title: String,
    pub status: String,
    pub confidence_pct: String,
    pub priority_score: String,
}

/// Split one CSV record. Handles quoted fields with `""` escapes.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Logical records of a CSV text. Physical lines are joined while a quoted
/// field is open; blank records are dropped.
fn records(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut open = false;
    for line in text.lines() {
        if open {
            current.push('\n');
        }
        current.push_str(line);
        open ^= line.matches('"').count() % 2 == 1;
        if !open {
            let record = std::mem::take(&mut current);
            if !record.trim().is_empty() {
                out.push(record);
            }
        }
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}

/// Rows of a CSV file as column → value maps, in file order.
pub fn read_csv(path: &Path) -> Result<Vec<HashMap<String, String>>, RunError> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RunError::MissingInput(path.display().to_string()),
        _ => RunError::Io(e),
    })?;
    let records = records(&text);
    let mut lines = records.iter();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns: Vec<String> = split_record(header.trim_start_matches('\u{feff}'))
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();
    Ok(lines
        .map(|line| {
            columns
                .iter()
                .cloned()
                .zip(split_record(line))
                .collect::<HashMap<_, _>>()
        })
        .collect())
}

/// Data records in a CSV file, excluding the header. A quoted field may span
/// lines. Zero for a missing file.
pub fn count_csv_rows(path: &Path) -> u64 {
    std::fs::read_to_string(path)
        .map(|t| records(&t).len().saturating_sub(1) as u64)
        .unwrap_or(0)
}

/// Locate `decision_id` in the decision log.
pub fn find_decision(log: &Path, decision_id: &str) -> Result<DecisionState, RunError> {
    let rows = read_csv(log)?;
    if let Some(first) = rows.first() {
        if !first.contains_key("DecisionID") {
            return Err(RunError::DecisionLog {
                path: log.display().to_string(),
                reason: "missing DecisionID column".into(),
            });
        }
    }
    let row = rows
        .into_iter()
        .find(|r| r.get("DecisionID").map(String::as_str) == Some(decision_id))
        .ok_or_else(|| RunError::DecisionNotFound {
            decision_id: decision_id.to_string(),
            log: log.display().to_string(),
        })?;
    let col = |name: &str, default: &str| {
        row.get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    };
    Ok(DecisionState {
        decision_id: decision_id.to_string(),
        title: col("Title", ""),
        status: col("Status", ""),
        confidence_pct: col("Confidence_pct", "0"),
        priority_score: col("PriorityScore", "0"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "DecisionID,Title,Status,Confidence_pct,PriorityScore\n\
DEC-001,\"Expand, carefully\",Approved,87.5,4.2\n\
DEC-002,\"Say \"\"no\"\"\",Rejected,,\n";

    fn write_log() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decision_log.csv");
        std::fs::write(&path, LOG).unwrap();
        (dir, path)
    }

    #[test]
    fn finds_row_with_quoted_comma() {
        let (_d, path) = write_log();
        let d = find_decision(&path, "DEC-001").unwrap();
        assert_eq!(d.title, "Expand, carefully");
        assert_eq!(d.confidence_pct, "87.5");
        assert_eq!(d.priority_score, "4.2");
    }

    #[test]
    fn escaped_quotes_and_empty_numbers() {
        let (_d, path) = write_log();
        let d = find_decision(&path, "DEC-002").unwrap();
        assert_eq!(d.title, "Say \"no\"");
        assert_eq!(d.confidence_pct, "0");
    }

    #[test]
    fn missing_decision_and_missing_log() {
        let (dir, path) = write_log();
        assert!(matches!(
            find_decision(&path, "DEC-404"),
            Err(RunError::DecisionNotFound { .. })
        ));
        assert!(matches!(
            find_decision(&dir.path().join("nope.csv"), "DEC-001"),
            Err(RunError::MissingInput(_))
        ));
    }

    #[test]
    fn row_count_excludes_header() {
        let (_d, path) = write_log();
        assert_eq!(count_csv_rows(&path), 2);
    }

    #[test]
    fn quoted_newline_stays_in_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risks.csv");
        std::fs::write(
            &path,
            "RiskID,Note\nR-1,\"spans\ntwo lines\"\n\nR-2,\"say \"\"hi\"\"\"\n",
        )
        .unwrap();
        assert_eq!(count_csv_rows(&path), 2);
        let rows = read_csv(&path).unwrap();
        assert_eq!(rows[0]["Note"], "spans\ntwo lines");
        assert_eq!(rows[1]["Note"], "say \"hi\"");
    }
}
