//! Conditional reads and updates of GDM-backed resources.
//!
//! A resource is some view of the GDM ([`GdmResource`]). Reading it yields a
//! [`Served`] representation: the fingerprint (sent as `ETag`) and the JSON
//! body with the canary embedded. An update must name what it was based on:
//!
//! | request                    | current resource         | outcome |
//! |----------------------------|--------------------------|---------|
//! | no precondition header     | any                      | 428     |
//! | `If-None-Match: *`         | exists                   | 412     |
//! | `If-Match: "<etag>"`       | missing or other etag    | 412     |
//! | `If-Match: "<etag>"`       | matches, bad canary      | 400     |
//! | either                     | body not a JSON object   | 400     |
//! | either, accepted           | store raced another write| 409     |
//!
//! Accepted updates are merged three ways onto the freshly read resource
//! and written back with the read's revision as the expected base.

use axum::http::{HeaderMap, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::etag::{compute_fingerprint, embed_canary, has_canary, parse_etag};
use crate::gdm::{Gdm, User};
use crate::merge::merge_values;
use crate::state::Revision;
use crate::util::hash::{Fingerprint, Fingerprinted};

use super::{ApiError, AppContext};

/// A view of the GDM that can be served and updated as a unit.
pub trait GdmResource: Send + Sync {
  type Value: Serialize + DeserializeOwned + Fingerprinted + Send + Sync;

  /// Names the resource in errors and logs.
  fn describe(&self) -> String;

  /// The resource as currently held in `gdm`, if it exists.
  fn extract(&self, gdm: &Gdm) -> Option<Self::Value>;

  /// Writes `value` into `gdm`.
  fn install(&self, gdm: &mut Gdm, value: Self::Value) -> Result<(), ApiError>;
}

/// A representation as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
  pub fingerprint: Fingerprint,
  /// Canonical JSON with the canary attribute added.
  pub body: Vec<u8>,
}

impl Served {
  pub fn encode<T: Fingerprinted>(value: &T) -> Result<Self, ApiError> {
    let fingerprint = compute_fingerprint(value)?;
    let canonical = value
      .canonical_bytes()
      .map_err(|e| ApiError::Internal(format!("failed to encode resource: {e}")))?;
    let body = embed_canary(&canonical, &fingerprint)?;
    Ok(Self { fingerprint, body })
  }
}

/// The precondition an update was sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
  /// Update the representation with this fingerprint.
  IfMatch(Fingerprint),
  /// Create; the resource must not exist yet.
  IfNoneMatch,
}

impl Precondition {
  pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
    let if_match = headers.get(header::IF_MATCH);
    let if_none_match = headers.get(header::IF_NONE_MATCH);

    match (if_match, if_none_match) {
      (Some(value), None) => {
        let value = value
          .to_str()
          .map_err(|_| ApiError::BadRequest("If-Match is not valid text".to_string()))?;
        parse_etag(value)
          .map(Precondition::IfMatch)
          .ok_or_else(|| ApiError::BadRequest(format!("If-Match must be a single strong ETag, got {value:?}")))
      }
      (None, Some(value)) if value.as_bytes() == b"*" => Ok(Precondition::IfNoneMatch),
      (None, Some(_)) => Err(ApiError::BadRequest("If-None-Match only supports \"*\"".to_string())),
      _ => Err(ApiError::PreconditionRequired),
    }
  }
}

/// The result of an accepted update.
#[derive(Debug)]
pub struct Updated<T> {
  pub value: T,
  pub served: Served,
  pub revision: Revision,
}

/// Reads a resource for serving.
pub async fn read<R: GdmResource>(ctx: &AppContext, resource: &R) -> Result<Served, ApiError> {
  let state = ctx.read_state().await?;
  let value = resource
    .extract(&state.gdm)
    .ok_or_else(|| ApiError::NotFound(format!("{} not found", resource.describe())))?;
  Served::encode(&value)
}

/// Runs a conditional update of a resource.
///
/// Reads once, validates the precondition and canary against that read,
/// merges, and writes once.
pub async fn update<R: GdmResource>(
  ctx: &AppContext,
  resource: &R,
  headers: &HeaderMap,
  body: &[u8],
  user: &User,
) -> Result<Updated<R::Value>, ApiError> {
  let precondition = Precondition::from_headers(headers)?;

  let state = ctx.read_state().await?;
  let current = match resource.extract(&state.gdm) {
    Some(value) => Some((Served::encode(&value)?, value)),
    None => None,
  };

  let (original, base) = match (&precondition, current) {
    (Precondition::IfNoneMatch, Some((served, _))) => {
      debug!(resource = %resource.describe(), "create of existing resource");
      return Err(ApiError::PreconditionFailed(Some(served)));
    }
    (Precondition::IfNoneMatch, None) => (Value::Object(Default::default()), Value::Object(Default::default())),
    (Precondition::IfMatch(_), None) => return Err(ApiError::PreconditionFailed(None)),
    (Precondition::IfMatch(etag), Some((served, value))) => {
      if &served.fingerprint != etag {
        debug!(resource = %resource.describe(), expected = %etag, actual = %served.fingerprint, "etag mismatch");
        return Err(ApiError::PreconditionFailed(Some(served)));
      }
      let original: Value = serde_json::from_slice(&served.body)
        .map_err(|e| ApiError::Internal(format!("failed to decode served body: {e}")))?;
      let base = serde_json::to_value(&value).map_err(|e| ApiError::Internal(e.to_string()))?;
      (original, base)
    }
  };

  let object = parse_object(body)?;
  if let Precondition::IfMatch(etag) = &precondition {
    check_canary(&object, etag)?;
  }
  let requested: R::Value =
    serde_json::from_value(Value::Object(object)).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))?;
  let changed = serde_json::to_value(&requested).map_err(|e| ApiError::Internal(e.to_string()))?;

  let merged = merge_values(original, &base, &changed).map_err(|e| ApiError::BadRequest(e.to_string()))?;
  let value: R::Value =
    serde_json::from_value(merged).map_err(|e| ApiError::BadRequest(format!("invalid merged resource: {e}")))?;

  let mut gdm = state.gdm;
  resource.install(&mut gdm, value)?;
  let revision = ctx.write_state(gdm.clone(), state.revision, user.clone()).await?;

  let value = resource
    .extract(&gdm)
    .ok_or_else(|| ApiError::Internal(format!("{} vanished after write", resource.describe())))?;
  let served = Served::encode(&value)?;
  info!(
    resource = %resource.describe(),
    user = %user.name,
    etag = %served.fingerprint,
    "resource updated"
  );

  Ok(Updated { value, served, revision })
}

/// Resource bodies are JSON objects; arrays in field order are not accepted.
fn parse_object(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
  match serde_json::from_slice::<Value>(body) {
    Ok(Value::Object(object)) => Ok(object),
    Ok(_) => Err(ApiError::BadRequest("body must be a JSON object".to_string())),
    Err(e) => Err(ApiError::BadRequest(format!("invalid body: {e}"))),
  }
}

fn check_canary(object: &Map<String, Value>, etag: &Fingerprint) -> Result<(), ApiError> {
  if !has_canary(object, etag) {
    return Err(ApiError::BadRequest(
      "missing or incorrect canary; re-fetch the resource and apply your change to that body".to_string(),
    ));
  }
  Ok(())
}
