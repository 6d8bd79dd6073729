//! Fingerprint and canary codec.
//!
//! A served representation is identified by a [`Fingerprint`] (sent as the
//! `ETag` header) and carries a canary: one extra attribute in its outermost
//! JSON object whose key is the fingerprint and whose value is the literal
//! `"canary"`. A later write must echo both, which proves the body it was
//! built from is exactly the one that was served.
//!
//! ```json
//! { "deployments": [], "3f1c...e9": "canary" }
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

use crate::consts::CANARY_VALUE;
use crate::util::hash::{Fingerprint, Fingerprinted};

#[derive(Debug, Error)]
pub enum CodecError {
  #[error("failed to serialize resource: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to parse body: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("body is not a JSON object")]
  NotAnObject,
}

/// Fingerprint of a resource's canonical JSON bytes.
pub fn compute_fingerprint<T: Fingerprinted + ?Sized>(resource: &T) -> Result<Fingerprint, CodecError> {
  resource.fingerprint().map_err(CodecError::Serialize)
}

/// Add the canary attribute keyed by `fingerprint` to the outermost object of `json`.
pub fn embed_canary(json: &[u8], fingerprint: &Fingerprint) -> Result<Vec<u8>, CodecError> {
  let mut object = decode_object(json)?;
  object.insert(fingerprint.0.clone(), Value::String(CANARY_VALUE.to_string()));
  serde_json::to_vec(&Value::Object(object)).map_err(CodecError::Serialize)
}

/// Check that `json` carries the canary for `fingerprint`.
///
/// Returns false when the body cannot be decoded as an object, when the
/// attribute is absent, or when its value is anything but `"canary"`.
pub fn validate_canary(json: &[u8], fingerprint: &Fingerprint) -> bool {
  match decode_object(json) {
    Ok(object) => has_canary(&object, fingerprint),
    Err(_) => false,
  }
}

/// Same check as [`validate_canary`] over an already-decoded object.
pub fn has_canary(object: &Map<String, Value>, fingerprint: &Fingerprint) -> bool {
  matches!(object.get(fingerprint.as_str()), Some(Value::String(s)) if s == CANARY_VALUE)
}

fn decode_object(json: &[u8]) -> Result<Map<String, Value>, CodecError> {
  match serde_json::from_slice(json).map_err(CodecError::Parse)? {
    Value::Object(object) => Ok(object),
    _ => Err(CodecError::NotAnObject),
  }
}

/// Render a fingerprint as a strong HTTP entity tag.
pub fn format_etag(fingerprint: &Fingerprint) -> String {
  format!("\"{}\"", fingerprint.0)
}

/// Parse an `If-Match`/`ETag` header value into a fingerprint.
///
/// Surrounding quotes are optional. Weak tags and lists are not accepted.
pub fn parse_etag(header: &str) -> Option<Fingerprint> {
  let trimmed = header.trim();
  if trimmed.is_empty() || trimmed.starts_with("W/") || trimmed.contains(',') {
    return None;
  }
  let unquoted = trimmed
    .strip_prefix('"')
    .and_then(|s| s.strip_suffix('"'))
    .unwrap_or(trimmed);
  if unquoted.is_empty() || unquoted == "*" {
    return None;
  }
  Some(Fingerprint(unquoted.to_string()))
}
