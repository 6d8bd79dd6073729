//! GDM types for convoy.
//!
//! The Global Deployment Manifest (GDM) is the central data structure that
//! captures the desired state of every deployment target across all clusters.
//! It is shared between servers, CLIs and the auto-resolver, and is the
//! document protected by fingerprint/canary optimistic concurrency.
//!
//! # Structure
//!
//! - [`Gdm`]: the whole document, a [`DeploymentSet`]
//! - [`DeploymentSet`]: set of [`Deployment`]s keyed by [`DeploymentTargetId`]
//! - [`Deployment`]: one target plus its [`DeploySpec`]
//!
//! # Example
//!
//! ```json
//! {
//!   "deployments": [
//!     { "repo": "github.com/acme/api", "dir": "", "flavor": "", "cluster": "east",
//!       "version": "1.4.0", "num_instances": 3 }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::util::hash::Fingerprinted;

/// Identifies one deployment target: a source location, an optional flavor,
/// and the cluster it runs in.
///
/// Field order defines the total ordering used for map keys and for the
/// canonical order of a [`DeploymentSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeploymentTargetId {
  pub repo: String,
  #[serde(default)]
  pub dir: String,
  #[serde(default)]
  pub flavor: String,
  pub cluster: String,
}

impl DeploymentTargetId {
  pub fn new(repo: impl Into<String>, cluster: impl Into<String>) -> Self {
    Self {
      repo: repo.into(),
      cluster: cluster.into(),
      ..Default::default()
    }
  }

  pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
    self.dir = dir.into();
    self
  }

  pub fn with_flavor(mut self, flavor: impl Into<String>) -> Self {
    self.flavor = flavor.into();
    self
  }

  /// Check that the parts required to address a target are present.
  pub fn validate(&self) -> Result<(), GdmError> {
    if self.repo.is_empty() {
      return Err(GdmError::MissingField("repo"));
    }
    if self.cluster.is_empty() {
      return Err(GdmError::MissingField("cluster"));
    }
    Ok(())
  }
}

impl std::fmt::Display for DeploymentTargetId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.cluster, self.repo)?;
    if !self.dir.is_empty() {
      write!(f, ",{}", self.dir)?;
    }
    if !self.flavor.is_empty() {
      write!(f, "~{}", self.flavor)?;
    }
    Ok(())
  }
}

fn one() -> u32 {
  1
}

/// Desired configuration of a single deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySpec {
  /// Version of the artifact to run.
  pub version: String,

  #[serde(default = "one")]
  pub num_instances: u32,

  #[serde(default)]
  pub env: BTreeMap<String, String>,

  /// Scheduler resource requests (cpus, memory, ports).
  #[serde(default)]
  pub resources: BTreeMap<String, String>,

  #[serde(default)]
  pub metadata: BTreeMap<String, String>,

  #[serde(default)]
  pub owners: BTreeSet<String>,
}

impl DeploySpec {
  pub fn new(version: impl Into<String>) -> Self {
    Self {
      version: version.into(),
      num_instances: 1,
      env: BTreeMap::new(),
      resources: BTreeMap::new(),
      metadata: BTreeMap::new(),
      owners: BTreeSet::new(),
    }
  }
}

impl Fingerprinted for DeploySpec {}

/// A deployment target together with its desired spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
  #[serde(flatten)]
  pub id: DeploymentTargetId,
  #[serde(flatten)]
  pub spec: DeploySpec,
}

impl Deployment {
  pub fn new(id: DeploymentTargetId, spec: DeploySpec) -> Self {
    Self { id, spec }
  }
}

#[derive(Serialize)]
struct DeploymentRef<'a> {
  #[serde(flatten)]
  id: &'a DeploymentTargetId,
  #[serde(flatten)]
  spec: &'a DeploySpec,
}

/// All deployments of a GDM, with set semantics.
///
/// Serialized as a JSON array sorted by [`DeploymentTargetId`], so two
/// documents that list the same deployments in a different order have the
/// same canonical bytes and therefore the same fingerprint. A target may
/// appear at most once; deserializing a duplicate is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentSet(BTreeMap<DeploymentTargetId, DeploySpec>);

impl DeploymentSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a set, rejecting duplicate targets.
  pub fn try_from_deployments(deployments: impl IntoIterator<Item = Deployment>) -> Result<Self, GdmError> {
    let mut set = Self::new();
    for deployment in deployments {
      if set.0.contains_key(&deployment.id) {
        return Err(GdmError::DuplicateTarget(deployment.id.to_string()));
      }
      set.0.insert(deployment.id, deployment.spec);
    }
    Ok(set)
  }

  pub fn get(&self, id: &DeploymentTargetId) -> Option<&DeploySpec> {
    self.0.get(id)
  }

  /// Insert or replace the spec for a target, returning the previous one.
  pub fn insert(&mut self, deployment: Deployment) -> Option<DeploySpec> {
    self.0.insert(deployment.id, deployment.spec)
  }

  pub fn remove(&mut self, id: &DeploymentTargetId) -> Option<DeploySpec> {
    self.0.remove(id)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Iterate deployments in canonical order.
  pub fn iter(&self) -> impl Iterator<Item = (&DeploymentTargetId, &DeploySpec)> {
    self.0.iter()
  }

  /// Deployments for a single cluster, in canonical order.
  pub fn in_cluster<'a>(&'a self, cluster: &'a str) -> impl Iterator<Item = Deployment> + 'a {
    self
      .0
      .iter()
      .filter(move |(id, _)| id.cluster == cluster)
      .map(|(id, spec)| Deployment::new(id.clone(), spec.clone()))
  }

  /// Names of every cluster referenced by the set, sorted.
  pub fn clusters(&self) -> BTreeSet<String> {
    self.0.keys().map(|id| id.cluster.clone()).collect()
  }
}

impl Serialize for DeploymentSet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(self.0.iter().map(|(id, spec)| DeploymentRef { id, spec }))
  }
}

impl<'de> Deserialize<'de> for DeploymentSet {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let list = Vec::<Deployment>::deserialize(deserializer)?;
    DeploymentSet::try_from_deployments(list).map_err(D::Error::custom)
  }
}

/// The Global Deployment Manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gdm {
  #[serde(default)]
  pub deployments: DeploymentSet,
}

impl Fingerprinted for Gdm {}

/// Observed lifecycle of a deployment on a cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
  #[default]
  Pending,
  Active,
  Failed,
  NotRunning,
}

/// A deployment as observed (or intended) on a cluster, with its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployable {
  pub deployment: Deployment,
  #[serde(default)]
  pub status: DeployStatus,
}

impl Deployable {
  pub fn new(deployment: Deployment, status: DeployStatus) -> Self {
    Self { deployment, status }
  }

  pub fn id(&self) -> &DeploymentTargetId {
    &self.deployment.id
  }
}

/// A request to converge one target: the currently observed deployable and
/// the desired one. Either side may be absent (create or delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectification {
  pub target: DeploymentTargetId,
  pub prior: Option<Deployable>,
  pub post: Option<Deployable>,
}

impl Rectification {
  pub fn new(target: DeploymentTargetId, prior: Option<Deployable>, post: Option<Deployable>) -> Self {
    Self { target, prior, post }
  }

  pub fn create(post: Deployable) -> Self {
    Self::new(post.id().clone(), None, Some(post))
  }

  pub fn delete(prior: Deployable) -> Self {
    Self::new(prior.id().clone(), Some(prior), None)
  }

  pub fn modify(prior: Deployable, post: Deployable) -> Self {
    Self::new(post.id().clone(), Some(prior), Some(post))
  }
}

/// The actor recorded against writes to the backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub name: String,
  pub email: String,
}

impl User {
  pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      email: email.into(),
    }
  }
}

/// Errors in GDM construction or addressing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GdmError {
  #[error("duplicate deployment target: {0}")]
  DuplicateTarget(String),

  #[error("missing required field: {0}")]
  MissingField(&'static str),
}
