//! HTTP client for a convoy server.
//!
//! Updates follow the conditional protocol: [`Client::retrieve`] keeps the
//! exact bytes served together with their fingerprint, and
//! [`Updater::update`] sends back those bytes with only the caller's changes
//! merged in (see [`crate::merge::putback`]). Fields the caller's type does
//! not model, and the canary, survive untouched.
//!
//! ```no_run
//! # async fn example() -> Result<(), convoy_lib::client::ClientError> {
//! use convoy_lib::client::Client;
//!
//! let client = Client::new("http://127.0.0.1:7800")?;
//! let (gdm, updater) = client.gdm().await?;
//! let mut changed = gdm.clone();
//! changed.deployments = Default::default();
//! updater.update(&changed).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::consts::{USER_EMAIL_HEADER, USER_NAME_HEADER};
use crate::etag::{format_etag, parse_etag};
use crate::gdm::{DeploySpec, DeploymentTargetId, Gdm, User};
use crate::merge::{MergeError, putback};
use crate::queue::{QueuedRectification, RectificationId};
use crate::rectify::AutoResolveReport;
use crate::server::wire::{QueueResponse, QueuesResponse, TargetQuery};
use crate::util::hash::Fingerprint;

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("invalid server url: {0}")]
  Url(#[from] url::ParseError),

  #[error("server requires a precondition header")]
  PreconditionRequired,

  #[error("resource changed since it was read")]
  PreconditionFailed,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflicting write: {0}")]
  Conflict(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  #[error("response carried no usable ETag")]
  MissingEtag,

  #[error("failed to encode or decode body: {0}")]
  Json(#[from] serde_json::Error),

  #[error("failed to merge changes: {0}")]
  Merge(#[from] MergeError),
}

impl ClientError {
  /// Whether redoing the whole read-merge-write may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, ClientError::Conflict(_) | ClientError::PreconditionFailed)
  }
}

/// A resource as retrieved: what was served, and the caller's typed view of it.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot<T> {
  pub fingerprint: Fingerprint,
  /// The body exactly as served, canary included.
  pub raw: Vec<u8>,
  pub typed: T,
}

#[derive(Debug, Clone)]
pub struct Client {
  http: reqwest::Client,
  base: Url,
  user: Option<User>,
}

impl Client {
  pub fn new(base_url: &str) -> Result<Self, ClientError> {
    Ok(Self {
      http: reqwest::Client::new(),
      base: Url::parse(base_url)?,
      user: None,
    })
  }

  /// Names the user recorded against writes.
  pub fn with_user(mut self, user: User) -> Self {
    self.user = Some(user);
    self
  }

  fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ClientError> {
    let mut url = self.base.join(path)?;
    if !query.is_empty() {
      url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let builder = self.http.request(method, url);
    match &self.user {
      Some(user) => builder
        .header(USER_NAME_HEADER, &user.name)
        .header(USER_EMAIL_HEADER, &user.email),
      None => builder,
    }
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
    let response = check(self.request(Method::GET, url).send().await?).await?;
    Ok(response.json().await?)
  }

  /// Reads a resource and prepares to update it.
  pub async fn retrieve<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<(T, Updater<T>), ClientError>
  where
    T: Serialize + DeserializeOwned + Clone,
  {
    let url = self.url(path, query)?;
    let response = check(self.request(Method::GET, url.clone()).send().await?).await?;
    let snapshot: ResourceSnapshot<T> = read_snapshot(response).await?;
    debug!(url = %url, etag = %snapshot.fingerprint, "retrieved resource");
    Ok((snapshot.typed.clone(), self.updater(url, snapshot)))
  }

  /// Creates a resource that must not exist yet (`If-None-Match: *`).
  pub async fn create<T>(&self, path: &str, query: &[(&str, &str)], value: &T) -> Result<Updated<T>, ClientError>
  where
    T: Serialize + DeserializeOwned + Clone,
  {
    let url = self.url(path, query)?;
    let request = self
      .request(Method::PUT, url.clone())
      .header(header::IF_NONE_MATCH, "*")
      .json(value);
    let response = check(request.send().await?).await?;
    self.updated(url, response).await
  }

  /// Retrieves, applies `change`, and updates, redoing the cycle up to
  /// `attempts` times when another writer got there first.
  pub async fn modify<T, F>(
    &self,
    path: &str,
    query: &[(&str, &str)],
    attempts: usize,
    mut change: F,
  ) -> Result<Updated<T>, ClientError>
  where
    T: Serialize + DeserializeOwned + Clone,
    F: FnMut(&mut T),
  {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
      let (mut value, updater) = self.retrieve::<T>(path, query).await?;
      change(&mut value);
      match updater.update(&value).await {
        Ok(updated) => return Ok(updated),
        Err(e) if e.is_retryable() && attempt < attempts => {
          warn!(path, attempt, error = %e, "update raced another writer, retrying");
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }

  pub async fn gdm(&self) -> Result<(Gdm, Updater<Gdm>), ClientError> {
    self.retrieve("/gdm", &[]).await
  }

  pub async fn deployment(&self, target: &DeploymentTargetId) -> Result<(DeploySpec, Updater<DeploySpec>), ClientError> {
    let query = TargetQuery::from(target);
    self.retrieve("/single-deployment", &query.pairs()).await
  }

  pub async fn queues(&self) -> Result<QueuesResponse, ClientError> {
    self.get_json(self.url("/deployqueues", &[])?).await
  }

  pub async fn queue(&self, target: &DeploymentTargetId) -> Result<QueueResponse, ClientError> {
    let query = TargetQuery::from(target);
    self.get_json(self.url("/deployqueue", &query.pairs())?).await
  }

  /// Looks up one rectification; with `wait`, blocks up to that long for its resolution.
  pub async fn item(
    &self,
    target: &DeploymentTargetId,
    id: &RectificationId,
    wait: Option<Duration>,
  ) -> Result<QueuedRectification, ClientError> {
    let query = TargetQuery::from(target);
    let mut pairs: Vec<(&str, String)> = query.pairs().iter().map(|(k, v)| (*k, v.to_string())).collect();
    pairs.push(("id", id.0.clone()));
    if let Some(wait) = wait {
      pairs.push(("wait", "true".to_string()));
      pairs.push(("timeout_secs", wait.as_secs().max(1).to_string()));
    }
    let pairs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    self.get_json(self.url("/deployqueue/item", &pairs)?).await
  }

  pub async fn rectify_all(&self) -> Result<AutoResolveReport, ClientError> {
    let url = self.url("/rectify-all", &[])?;
    let response = check(self.request(Method::POST, url).send().await?).await?;
    Ok(response.json().await?)
  }

  fn updater<T>(&self, url: Url, snapshot: ResourceSnapshot<T>) -> Updater<T> {
    Updater {
      client: self.clone(),
      url,
      snapshot,
    }
  }

  async fn updated<T>(&self, url: Url, response: Response) -> Result<Updated<T>, ClientError>
  where
    T: DeserializeOwned + Clone,
  {
    let location = response
      .headers()
      .get(header::LOCATION)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string);
    let snapshot: ResourceSnapshot<T> = read_snapshot(response).await?;
    Ok(Updated {
      value: snapshot.typed.clone(),
      updater: self.updater(url, snapshot),
      location,
    })
  }
}

/// Updates the resource a [`Client::retrieve`] read.
#[derive(Debug, Clone)]
pub struct Updater<T> {
  client: Client,
  url: Url,
  snapshot: ResourceSnapshot<T>,
}

/// An accepted update.
#[derive(Debug, Clone)]
pub struct Updated<T> {
  /// The resource as the server now holds it.
  pub value: T,
  /// Ready for a further update of the same resource.
  pub updater: Updater<T>,
  /// Where the server reported follow-up work, if anywhere.
  pub location: Option<String>,
}

impl<T> Updated<T> {
  /// The rectification id named by the `Location` header.
  pub fn rectification_id(&self) -> Option<RectificationId> {
    let location = self.location.as_deref()?;
    let (_, query) = location.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
      .find(|(key, _)| key == "id")
      .map(|(_, value)| RectificationId(value.into_owned()))
  }
}

impl<T> Updater<T>
where
  T: Serialize + DeserializeOwned + Clone,
{
  pub fn snapshot(&self) -> &ResourceSnapshot<T> {
    &self.snapshot
  }

  /// Sends `new`, merged onto the served bytes, conditional on the served ETag.
  pub async fn update(&self, new: &T) -> Result<Updated<T>, ClientError> {
    let base = serde_json::to_value(&self.snapshot.typed)?;
    let changed = serde_json::to_value(new)?;
    let merged = putback(&self.snapshot.raw, &base, &changed)?;

    let request = self
      .client
      .request(Method::PUT, self.url.clone())
      .header(header::IF_MATCH, format_etag(&self.snapshot.fingerprint))
      .json(&merged);
    let response = check(request.send().await?).await?;
    self.client.updated(self.url.clone(), response).await
  }
}

async fn read_snapshot<T: DeserializeOwned>(response: Response) -> Result<ResourceSnapshot<T>, ClientError> {
  let fingerprint = response
    .headers()
    .get(header::ETAG)
    .and_then(|v| v.to_str().ok())
    .and_then(parse_etag)
    .ok_or(ClientError::MissingEtag)?;
  let raw = response.bytes().await?.to_vec();
  let typed = serde_json::from_slice(&raw)?;
  Ok(ResourceSnapshot { fingerprint, raw, typed })
}

/// Maps error statuses to [`ClientError`]s.
async fn check(response: Response) -> Result<Response, ClientError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let message = error_message(response).await;
  Err(match status {
    StatusCode::PRECONDITION_REQUIRED => ClientError::PreconditionRequired,
    StatusCode::PRECONDITION_FAILED => ClientError::PreconditionFailed,
    StatusCode::BAD_REQUEST => ClientError::BadRequest(message),
    StatusCode::CONFLICT => ClientError::Conflict(message),
    StatusCode::NOT_FOUND => ClientError::NotFound(message),
    _ => ClientError::Server {
      status: status.as_u16(),
      message,
    },
  })
}

async fn error_message(response: Response) -> String {
  let text = response.text().await.unwrap_or_default();
  match serde_json::from_str::<serde_json::Value>(&text) {
    Ok(body) => body
      .get("error")
      .and_then(|e| e.as_str())
      .map(str::to_string)
      .unwrap_or(text),
    Err(_) => text,
  }
}
