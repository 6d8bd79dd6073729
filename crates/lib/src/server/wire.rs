//! Request and response bodies shared by the server and [`crate::client`].

use serde::{Deserialize, Serialize};

use crate::gdm::DeploymentTargetId;
use crate::queue::QueuedRectification;

/// Query string addressing one deployment target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetQuery {
  #[serde(default)]
  pub repo: String,
  #[serde(default)]
  pub dir: String,
  #[serde(default)]
  pub flavor: String,
  #[serde(default)]
  pub cluster: String,
}

impl From<&DeploymentTargetId> for TargetQuery {
  fn from(id: &DeploymentTargetId) -> Self {
    Self {
      repo: id.repo.clone(),
      dir: id.dir.clone(),
      flavor: id.flavor.clone(),
      cluster: id.cluster.clone(),
    }
  }
}

impl From<TargetQuery> for DeploymentTargetId {
  fn from(q: TargetQuery) -> Self {
    DeploymentTargetId::new(q.repo, q.cluster)
      .with_dir(q.dir)
      .with_flavor(q.flavor)
  }
}

impl TargetQuery {
  /// Query pairs in a stable order, for building URLs.
  pub fn pairs(&self) -> [(&'static str, &str); 4] {
    [
      ("repo", self.repo.as_str()),
      ("dir", self.dir.as_str()),
      ("flavor", self.flavor.as_str()),
      ("cluster", self.cluster.as_str()),
    ]
  }
}

/// Query for `/deployqueue/item`.
///
/// The target fields are spelled out rather than flattened: flattened
/// structs lose typed parsing of `wait` and `timeout_secs` in query strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuery {
  #[serde(default)]
  pub repo: String,
  #[serde(default)]
  pub dir: String,
  #[serde(default)]
  pub flavor: String,
  #[serde(default)]
  pub cluster: String,
  #[serde(default)]
  pub id: String,
  /// Block until the item is resolved.
  #[serde(default)]
  pub wait: bool,
  /// Shorter bound on the wait than the server's configured one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_secs: Option<u64>,
}

impl ItemQuery {
  pub fn target(&self) -> DeploymentTargetId {
    DeploymentTargetId::new(self.repo.clone(), self.cluster.clone())
      .with_dir(self.dir.clone())
      .with_flavor(self.flavor.clone())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
  pub target: DeploymentTargetId,
  pub length: usize,
}

/// Body of `GET /deployqueues`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuesResponse {
  pub queues: Vec<QueueSummary>,
}

/// Body of `GET /deployqueue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueResponse {
  pub target: DeploymentTargetId,
  pub queue: Vec<QueuedRectification>,
}
