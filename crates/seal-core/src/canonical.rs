//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only input accepted by the content hasher, the
//! HMAC signer and the Ed25519 signer. Every "hash of X" in the workspace is
//! `sha256_digest(&CanonicalBytes::new(&x)?)`.
//!
//! ## Rules
//!
//! 1. Object keys are sorted lexicographically at every nesting level.
//! 2. Separators are compact; output is UTF-8 without escaping non-ASCII.
//! 3. Floats are rejected. Scores and percentages travel as decimal strings,
//!    integers pass through unchanged.
//!
//! Serialization is RFC 8785 (JCS) via `serde_jcs`, applied after the value
//! has been lowered to a `serde_json::Value` and checked for floats. Two
//! structurally equal values therefore always produce identical bytes,
//! regardless of field or insertion order.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
///
/// The inner buffer is private; [`CanonicalBytes::new`] is the only
/// constructor, so any function taking `&CanonicalBytes` is guaranteed to see
/// deterministic input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// `FloatRejected` if the value contains a non-integer number,
    /// `SerializationFailed` if the value cannot be lowered to JSON.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Canonicalize a JSON value with one top-level field replaced by `""`.
    ///
    /// This is the shape every self-hashing document uses: the hash field is
    /// blanked, never removed, before the digest is taken.
    pub fn with_blanked_field(value: &Value, field: &str) -> Result<Self, CanonicalizationError> {
        let mut copy = value.clone();
        if let Value::Object(map) = &mut copy {
            map.insert(field.to_string(), Value::String(String::new()));
        }
        Self::new(&copy)
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Canonical bytes as UTF-8 text.
    pub fn as_str(&self) -> &str {
        // serde_jcs only ever emits UTF-8.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(f));
                }
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(reject_floats),
        Value::Object(map) => map.values().try_for_each(reject_floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_at_every_level() {
        let data = json!({"outer": {"b": 2, "a": 1}, "list": [3, 2, 1], "c": "x"});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_str(), r#"{"c":"x","list":[3,2,1],"outer":{"a":1,"b":2}}"#);
    }

    #[test]
    fn struct_field_order_does_not_matter() {
        #[derive(Serialize)]
        struct Ab {
            a: u32,
            b: &'static str,
        }
        #[derive(Serialize)]
        struct Ba {
            b: &'static str,
            a: u32,
        }
        let x = CanonicalBytes::new(&Ab { a: 1, b: "q" }).unwrap();
        let y = CanonicalBytes::new(&Ba { b: "q", a: 1 }).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn rejects_nested_float() {
        let data = json!({"decision": {"confidence_pct": 87.5}});
        match CanonicalBytes::new(&data) {
            Err(CanonicalizationError::FloatRejected(f)) => assert_eq!(f, 87.5),
            other => panic!("expected FloatRejected, got {other:?}"),
        }
    }

    #[test]
    fn accepts_integers_null_and_bools() {
        let data = json!({"n": -42, "big": 9999999999i64, "z": null, "t": true});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_str(), r#"{"big":9999999999,"n":-42,"t":true,"z":null}"#);
    }

    #[test]
    fn empty_containers() {
        assert_eq!(CanonicalBytes::new(&json!({})).unwrap().as_bytes(), b"{}");
        assert_eq!(CanonicalBytes::new(&json!([])).unwrap().as_bytes(), b"[]");
    }

    #[test]
    fn unicode_is_not_escaped() {
        let cb = CanonicalBytes::new(&json!({"name": "\u{00e9}t\u{00e9}"})).unwrap();
        assert!(cb.as_str().contains('\u{00e9}'));
    }

    #[test]
    fn blanked_field_replaces_value() {
        let doc = json!({"hash": "sha256:abc", "x": 1});
        let cb = CanonicalBytes::with_blanked_field(&doc, "hash").unwrap();
        assert_eq!(cb.as_str(), r#"{"hash":"","x":1}"#);
    }

    #[test]
    fn blanked_field_is_added_when_missing() {
        let doc = json!({"x": 1});
        let cb = CanonicalBytes::with_blanked_field(&doc, "entry_hash").unwrap();
        assert_eq!(cb.as_str(), r#"{"entry_hash":"","x":1}"#);
    }
}
