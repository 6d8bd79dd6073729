//! Hashing utilities for content fingerprints.
//!
//! This module provides:
//! - `Fingerprint`: A full 64-character hash identifying one representation of a resource
//! - `Fingerprinted`: Canonical-JSON fingerprinting for any serializable value
//! - `hash_bytes()`: Arbitrary byte hashing

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type HashError = serde_json::Error;

/// A content-derived version marker, used as an HTTP entity tag.
///
/// Two values with identical semantic content always produce the same
/// fingerprint; see [`Fingerprinted`] for how canonical bytes are formed.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for Fingerprint {
  fn from(s: &str) -> Self {
    Fingerprint(s.to_string())
  }
}

/// Types whose fingerprint is the hash of their canonical JSON bytes.
///
/// The value is first converted to a [`serde_json::Value`], whose object maps
/// are ordered by key, so field order in the Rust type or on the wire never
/// affects the result. Types with set semantics must serialize their elements
/// in a stable order themselves (see `DeploymentSet`).
pub trait Fingerprinted: Serialize {
  fn canonical_bytes(&self) -> Result<Vec<u8>, HashError> {
    let value = serde_json::to_value(self)?;
    serde_json::to_vec(&value)
  }

  fn fingerprint(&self) -> Result<Fingerprint, HashError> {
    Ok(hash_bytes(&self.canonical_bytes()?))
  }
}

impl Fingerprinted for serde_json::Value {}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn hash_bytes(data: &[u8]) -> Fingerprint {
  let mut hasher = Sha256::new();
  hasher.update(data);
  Fingerprint(hex::encode(hasher.finalize()))
}
