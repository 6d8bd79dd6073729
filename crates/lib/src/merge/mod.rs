//! Three-way JSON merge ("putback").
//!
//! A client reads a resource, decodes it into its own type (which may not
//! model every field the server sent), edits it, and wants to write it back.
//! Sending its typed value verbatim would silently drop fields it never knew
//! about. Instead the edit is computed as the difference between two
//! re-serializations of the client's type, `base` (what it read) and `changed`
//! (what it wants), and that difference is applied onto `original`, the raw
//! bytes that were actually served:
//!
//! - a key in `changed` but not in `base` is created in the result
//! - a key in both whose values differ is overwritten with the `changed` value
//! - a key in both whose values are equal is left as the result already has it
//! - nested objects present on both sides are merged recursively
//! - a key in `base` but not in `changed` is deleted from the result
//!
//! Fields absent from both `base` and `changed` are never touched.
//!
//! Arrays are compared positionally. Reordering an array of unchanged
//! elements therefore reads as a change and overwrites the array as a whole.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
  #[error("failed to parse original body: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("{0} is not a JSON object")]
  NotAnObject(&'static str),
}

/// Apply the change from `base` to `changed` onto the raw `original` bytes.
pub fn putback(original: &[u8], base: &Value, changed: &Value) -> Result<Value, MergeError> {
  let original: Value = serde_json::from_slice(original).map_err(MergeError::Parse)?;
  merge_values(original, base, changed)
}

/// [`putback`] over an already-decoded original.
pub fn merge_values(original: Value, base: &Value, changed: &Value) -> Result<Value, MergeError> {
  let Value::Object(target) = original else {
    return Err(MergeError::NotAnObject("original"));
  };
  let Value::Object(base) = base else {
    return Err(MergeError::NotAnObject("base"));
  };
  let Value::Object(changed) = changed else {
    return Err(MergeError::NotAnObject("changed"));
  };

  Ok(Value::Object(apply_changes(base.clone(), changed, target)))
}

fn apply_changes(
  mut base: Map<String, Value>,
  changed: &Map<String, Value>,
  mut target: Map<String, Value>,
) -> Map<String, Value> {
  for (key, value) in changed {
    let Some(before) = base.remove(key) else {
      target.insert(key.clone(), value.clone());
      continue;
    };

    if deep_equal(&before, value) {
      continue;
    }

    match (before, value) {
      (Value::Object(before), Value::Object(after)) => {
        let nested = match target.remove(key) {
          Some(Value::Object(existing)) => existing,
          _ => Map::new(),
        };
        target.insert(key.clone(), Value::Object(apply_changes(before, after, nested)));
      }
      _ => {
        target.insert(key.clone(), value.clone());
      }
    }
  }

  for key in base.keys() {
    target.remove(key);
  }

  target
}

/// Structural equality over JSON values.
///
/// Objects compare key by key, arrays by length then element by element at
/// the same index. Numbers compare by value, so `1` equals `1.0`.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::Object(a), Value::Object(b)) => {
      a.len() == b.len() && a.iter().all(|(k, va)| b.get(k).is_some_and(|vb| deep_equal(va, vb)))
    }
    (Value::Array(a), Value::Array(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_equal(x, y)),
    (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
      (Some(x), Some(y)) => x == y,
      _ => match (a.as_u64(), b.as_u64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_f64() == b.as_f64(),
      },
    },
    _ => a == b,
  }
}
