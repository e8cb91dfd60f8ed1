//! # Hash Chain
//!
//! Shared shape of every ledger record: a typed body flattened next to
//! `prev_entry_hash` and `entry_hash`.
//!
//! `entry_hash = sha256(canonical(record with entry_hash = "" and without
//! observed_at))`. The first record has `prev_entry_hash = null`; every later
//! record links to the `entry_hash` of the record before it.
//!
//! Hashes are computed on the raw JSON object, not on the typed body, so a
//! verifier sees exactly what is on disk, including unknown fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use seal_core::{sha256_digest, CanonicalBytes, Severity, Timestamp, VerificationReport};

use crate::error::LedgerError;
use crate::store::NdjsonStore;

/// Wall-clock field recorded on append and excluded from the entry hash.
pub const OBSERVED_AT: &str = "observed_at";

/// A record body with its chain linkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chained<T> {
    #[serde(flatten)]
    pub body: T,
    pub prev_entry_hash: Option<String>,
    pub entry_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<Timestamp>,
}

/// Hash of a raw record with `entry_hash` blanked and `observed_at` removed.
pub fn compute_entry_hash(record: &Value) -> Result<String, LedgerError> {
    let mut copy = record.clone();
    if let Value::Object(map) = &mut copy {
        map.remove(OBSERVED_AT);
    }
    let canonical = CanonicalBytes::with_blanked_field(&copy, "entry_hash")?;
    Ok(sha256_digest(&canonical).to_string())
}

/// Serialize `body`, link it to `prev`, and fill in `entry_hash`.
pub fn seal_record<T: Serialize>(
    body: &T,
    prev: Option<&Value>,
    observed_at: Option<Timestamp>,
) -> Result<Value, LedgerError> {
    let prev_hash = match prev {
        Some(p) => Some(
            p.get("entry_hash")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    LedgerError::InvalidEntry("previous record has no entry_hash".into())
                })?
                .to_string(),
        ),
        None => None,
    };
    let mut record = serde_json::to_value(body)?;
    let Value::Object(map) = &mut record else {
        return Err(LedgerError::InvalidEntry(
            "ledger record body must be a JSON object".into(),
        ));
    };
    map.insert(
        "prev_entry_hash".into(),
        prev_hash.map(Value::String).unwrap_or(Value::Null),
    );
    map.insert("entry_hash".into(), Value::String(String::new()));
    if let Some(ts) = observed_at {
        map.insert(OBSERVED_AT.into(), Value::String(ts.to_iso8601()));
    }
    let hash = compute_entry_hash(&record)?;
    if let Value::Object(map) = &mut record {
        map.insert("entry_hash".into(), Value::String(hash));
    }
    Ok(record)
}

/// Append `body` to `store` as a new chained record.
pub fn append_chained<T, F>(
    store: &NdjsonStore,
    observed_at: Option<Timestamp>,
    build: F,
) -> Result<Chained<T>, LedgerError>
where
    T: Serialize + for<'de> Deserialize<'de>,
    F: FnOnce(Option<&Value>) -> Result<T, LedgerError>,
{
    let record = store.append_with(|prev| {
        let body = build(prev)?;
        seal_record(&body, prev, observed_at)
    })?;
    Ok(serde_json::from_value(record)?)
}

/// Recompute every `entry_hash` and `prev_entry_hash` link in file order.
///
/// Produces two checks per record, `line[N].entry_hash` and `line[N].link`.
/// Records before the first break are judged on their own. Once a record
/// fails (bad hash, bad link or unparseable), every later `link` check fails
/// with a pointer to the break, while later `entry_hash` checks still report
/// each record's self-consistency.
pub fn verify_chain(store: &NdjsonStore) -> VerificationReport {
    let mut report = VerificationReport::new();
    if !store.exists() {
        report.fail(
            "ledger.exists",
            format!("{} not found", store.path().display()),
            Severity::MissingFile,
        );
        return report;
    }
    let records = match store.read_raw() {
        Ok(r) => r,
        Err(e) => {
            report.fail("ledger.read", e.to_string(), Severity::Structural);
            return report;
        }
    };
    if records.is_empty() {
        report.pass("ledger.entries", "empty ledger (no entries)");
        return report;
    }

    let mut prev_hash: Option<String> = None;
    let mut broken_at: Option<usize> = None;
    for (index, raw) in records.iter().enumerate() {
        let line = raw.line;
        let entry: Value = match serde_json::from_str(&raw.text) {
            Ok(v) => v,
            Err(e) => {
                report.fail(
                    format!("line[{line}].json"),
                    format!("invalid JSON: {e}"),
                    Severity::Structural,
                );
                broken_at.get_or_insert(line);
                continue;
            }
        };
        let recorded = entry
            .get("entry_hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let entry_id = entry
            .get("entry_id")
            .and_then(Value::as_str)
            .unwrap_or("?");

        let hash_ok = match compute_entry_hash(&entry) {
            Ok(computed) => report.record(
                format!("line[{line}].entry_hash"),
                computed == recorded,
                if computed == recorded {
                    format!("entry_hash valid ({entry_id})")
                } else {
                    format!("computed {computed} != recorded {recorded}")
                },
                Severity::Hash,
            ),
            Err(e) => {
                report.fail(
                    format!("line[{line}].entry_hash"),
                    format!("cannot canonicalize entry: {e}"),
                    Severity::Structural,
                );
                false
            }
        };

        let recorded_prev = entry
            .get("prev_entry_hash")
            .and_then(Value::as_str)
            .map(str::to_string);
        let link_ok = if let Some(first) = broken_at {
            report.fail(
                format!("line[{line}].link"),
                format!("after chain break at line {first}"),
                Severity::Hash,
            );
            false
        } else if index == 0 {
            report.record(
                format!("line[{line}].link"),
                recorded_prev.is_none(),
                if recorded_prev.is_none() {
                    "chain head (prev=null)".to_string()
                } else {
                    "first entry must have null prev_entry_hash".to_string()
                },
                Severity::Hash,
            )
        } else {
            let ok = recorded_prev == prev_hash;
            report.record(
                format!("line[{line}].link"),
                ok,
                if ok {
                    "chain link valid".to_string()
                } else {
                    format!(
                        "chain break: prev should be {} but is {}",
                        prev_hash.as_deref().unwrap_or("null"),
                        recorded_prev.as_deref().unwrap_or("null")
                    )
                },
                Severity::Hash,
            )
        };
        if !(hash_ok && link_ok) {
            broken_at.get_or_insert(line);
        }
        prev_hash = Some(recorded);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        entry_id: String,
        text: String,
    }

    fn note(id: &str) -> Note {
        Note {
            entry_id: id.into(),
            text: format!("note {id}"),
        }
    }

    fn seeded(n: usize) -> (tempfile::TempDir, NdjsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = NdjsonStore::new(dir.path().join("chain.ndjson"));
        for i in 0..n {
            append_chained(&store, None, |_| Ok(note(&format!("N-{i}")))).unwrap();
        }
        (dir, store)
    }

    #[test]
    fn first_record_has_null_prev() {
        let (_dir, store) = seeded(2);
        let records: Vec<Chained<Note>> = store.read_all().unwrap();
        assert!(records[0].prev_entry_hash.is_none());
        assert_eq!(
            records[1].prev_entry_hash.as_deref(),
            Some(records[0].entry_hash.as_str())
        );
    }

    #[test]
    fn entry_hash_ignores_observed_at() {
        let body = note("N-0");
        let a = seal_record(&body, None, None).unwrap();
        let b = seal_record(
            &body,
            None,
            Some(Timestamp::parse("2026-01-01T00:00:00Z").unwrap()),
        )
        .unwrap();
        assert_eq!(a["entry_hash"], b["entry_hash"]);
        assert!(b.get(OBSERVED_AT).is_some());
    }

    #[test]
    fn intact_chain_verifies() {
        let (_dir, store) = seeded(4);
        let report = verify_chain(&store);
        assert!(report.passed(), "{report}");
        assert_eq!(report.len(), 8);
    }

    #[test]
    fn missing_ledger_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let report = verify_chain(&NdjsonStore::new(dir.path().join("none.ndjson")));
        assert_eq!(report.exit_code(), 4);
    }

    #[test]
    fn empty_ledger_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.ndjson");
        std::fs::write(&path, "").unwrap();
        assert!(verify_chain(&NdjsonStore::new(path)).passed());
    }

    #[test]
    fn tampered_field_fails_the_chain_from_that_entry_on() {
        let (_dir, store) = seeded(4);
        let mut values = store.read_values().unwrap();
        values[2]["text"] = json!("forged");
        let text: String = values
            .iter()
            .map(|v| serde_json::to_string(v).unwrap() + "\n")
            .collect();
        std::fs::write(store.path(), text).unwrap();

        let report = verify_chain(&store);
        assert!(!report.passed());
        assert!(report.get("line[1].entry_hash").unwrap().passed);
        assert!(report.get("line[2].entry_hash").unwrap().passed);
        assert!(report.get("line[2].link").unwrap().passed);
        assert!(!report.get("line[3].entry_hash").unwrap().passed);
        // Line 4 is self-consistent and links to line 3's recorded hash, but
        // follows the break.
        assert!(report.get("line[4].entry_hash").unwrap().passed);
        let after = report.get("line[4].link").unwrap();
        assert!(!after.passed);
        assert!(after.detail.contains("line 3"), "{}", after.detail);
        assert_eq!(report.exit_code(), 3);
    }

    #[test]
    fn reordered_entries_break_links() {
        let (_dir, store) = seeded(3);
        let mut values = store.read_values().unwrap();
        values.swap(1, 2);
        let text: String = values
            .iter()
            .map(|v| serde_json::to_string(v).unwrap() + "\n")
            .collect();
        std::fs::write(store.path(), text).unwrap();

        let report = verify_chain(&store);
        assert!(report.get("line[1].link").unwrap().passed);
        assert!(!report.get("line[2].link").unwrap().passed);
        assert!(!report.get("line[3].link").unwrap().passed);
    }

    #[test]
    fn garbage_line_is_structural_and_verification_continues() {
        let (_dir, store) = seeded(2);
        let mut text = std::fs::read_to_string(store.path()).unwrap();
        text.push_str("{oops\n");
        std::fs::write(store.path(), text).unwrap();
        let report = verify_chain(&store);
        assert!(report.get("line[1].entry_hash").unwrap().passed);
        assert!(!report.get("line[3].json").unwrap().passed);
        assert_eq!(report.exit_code(), 2);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_single_mutation_is_detected_from_that_entry(
            n in 2usize..6,
            target in any::<prop::sample::Index>(),
            payload in "[a-z]{1,12}",
        ) {
            let dir = tempfile::tempdir().unwrap();
            let store = NdjsonStore::new(dir.path().join("c.ndjson"));
            for i in 0..n {
                append_chained(&store, None, |_| {
                    Ok(json!({"entry_id": format!("E-{i}"), "v": i}))
                }).unwrap();
            }
            let t = target.index(n);
            let mut values = store.read_values().unwrap();
            values[t]["v"] = json!(payload);
            let text: String = values
                .iter()
                .map(|v| serde_json::to_string(v).unwrap() + "\n")
                .collect();
            std::fs::write(store.path(), text).unwrap();

            let report = verify_chain(&store);
            prop_assert!(!report.passed());
            for line in 1..=t {
                let hash_ok = report.get(&format!("line[{line}].entry_hash")).unwrap().passed;
                let link_ok = report.get(&format!("line[{line}].link")).unwrap().passed;
                prop_assert!(hash_ok);
                prop_assert!(link_ok);
            }
            let tampered_ok = report.get(&format!("line[{}].entry_hash", t + 1)).unwrap().passed;
            prop_assert!(!tampered_ok);
            for line in t + 2..=n {
                let link_ok = report.get(&format!("line[{line}].link")).unwrap().passed;
                prop_assert!(!link_ok);
            }
        }
    }
}
