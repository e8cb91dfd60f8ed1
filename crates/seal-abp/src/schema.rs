//! Embedded `abp_v1` JSON schema (Draft 2020-12).

use jsonschema::Validator;
use serde_json::Value;

use crate::error::AbpError;

pub const ABP_SCHEMA: &str = include_str!("../schemas/abp_v1.schema.json");

fn validator() -> Result<Validator, AbpError> {
    let schema: Value = serde_json::from_str(ABP_SCHEMA)
        .map_err(|e| AbpError::Schema(format!("embedded schema is not JSON: {e}")))?;
    let mut opts = jsonschema::options();
    opts.with_draft(jsonschema::Draft::Draft202012);
    opts.build(&schema)
        .map_err(|e| AbpError::Schema(e.to_string()))
}

/// Schema violations of `abp`, as `path: message` strings. Empty when valid.
pub fn schema_violations(abp: &Value) -> Result<Vec<String>, AbpError> {
    let validator = validator()?;
    Ok(validator
        .iter_errors(abp)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                format!("(root): {e}")
            } else {
                format!("{path}: {e}")
            }
        })
        .collect())
}
