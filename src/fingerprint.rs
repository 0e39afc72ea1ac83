//! Deterministic cache keys for generation requests
//!
//! A fingerprint is derived from `(template_id, data, options)`:
//! 1. Both JSON values are canonicalized (object keys sorted at every depth,
//!    array order preserved, scalars untouched).
//! 2. The triple is encoded as canonical JSON and hashed with SHA-256.
//! 3. The hex digest is truncated to [`FINGERPRINT_DIGEST_LEN`] characters
//!    and prefixed with the template id, so keys stay traceable in logs and
//!    on disk.
//!
//! Structurally equal inputs always produce the same key, regardless of the
//! order keys were inserted in.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::constants::{FINGERPRINT_DIGEST_LEN, MAX_CANONICAL_DEPTH};
use crate::error::GenerationError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("template id cannot be empty")]
    EmptyTemplateId,

    #[error("input nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("input is not serializable as JSON: {0}")]
    NotSerializable(String),
}

impl From<FingerprintError> for GenerationError {
    fn from(err: FingerprintError) -> Self {
        GenerationError::Validation(err.to_string())
    }
}

/// Compute the fingerprint of a generation request
pub fn fingerprint(
    template_id: &str,
    data: &Value,
    options: &Value,
) -> Result<String, FingerprintError> {
    if template_id.is_empty() {
        return Err(FingerprintError::EmptyTemplateId);
    }

    // Keys in lexicographic order: data, options, templateId
    let mut encoded = String::with_capacity(256);
    encoded.push_str("{\"data\":");
    write_canonical(data, &mut encoded, 0)?;
    encoded.push_str(",\"options\":");
    write_canonical(options, &mut encoded, 0)?;
    encoded.push_str(",\"templateId\":");
    write_scalar(&Value::String(template_id.to_string()), &mut encoded);
    encoded.push('}');

    let digest = hex::encode(Sha256::digest(encoded.as_bytes()));
    Ok(format!(
        "{}-{}",
        template_id,
        &digest[..FINGERPRINT_DIGEST_LEN]
    ))
}

/// Fingerprint any serializable data/options pair
///
/// Fails fast if either value cannot be represented as JSON (for example a
/// map with non-string keys).
pub fn fingerprint_of<D, O>(template_id: &str, data: &D, options: &O) -> Result<String, FingerprintError>
where
    D: Serialize + ?Sized,
    O: Serialize + ?Sized,
{
    let data = serde_json::to_value(data)
        .map_err(|e| FingerprintError::NotSerializable(e.to_string()))?;
    let options = serde_json::to_value(options)
        .map_err(|e| FingerprintError::NotSerializable(e.to_string()))?;
    fingerprint(template_id, &data, &options)
}

/// Canonical JSON encoding of a value (sorted object keys, compact)
pub fn canonical_json(value: &Value) -> Result<String, FingerprintError> {
    let mut out = String::new();
    write_canonical(value, &mut out, 0)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String, depth: usize) -> Result<(), FingerprintError> {
    if depth > MAX_CANONICAL_DEPTH {
        return Err(FingerprintError::TooDeep(MAX_CANONICAL_DEPTH));
    }

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_scalar(&Value::String(key.clone()), out);
                out.push(':');
                write_canonical(&map[key], out, depth + 1)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out, depth + 1)?;
            }
            out.push(']');
        }
        scalar => write_scalar(scalar, out),
    }

    Ok(())
}

fn write_scalar(value: &Value, out: &mut String) {
    // Scalars never fail to serialize
    out.push_str(&value.to_string());
}
