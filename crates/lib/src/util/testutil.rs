//! Test utilities for convoy-lib.
//!
//! Sample deployments and resolvers with controllable timing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::gdm::{DeployStatus, DeploySpec, Deployable, Deployment, DeploymentTargetId, Rectification};
use crate::queue::{QueuedRectification, RectificationId, Resolution, ResolutionError, ResolutionKind, Resolver};

pub fn sample_deployment(repo: &str, cluster: &str, version: &str) -> Deployment {
  Deployment::new(DeploymentTargetId::new(repo, cluster), DeploySpec::new(version))
}

pub fn sample_deployable(repo: &str, cluster: &str, version: &str) -> Deployable {
  Deployable::new(sample_deployment(repo, cluster, version), DeployStatus::Active)
}

/// A rectification creating `repo` at `version` on `cluster`.
pub fn create_rectification(repo: &str, cluster: &str, version: &str) -> Rectification {
  Rectification::create(sample_deployable(repo, cluster, version))
}

/// Resolves every item successfully and records the order it saw them in.
///
/// When gated, each resolution first takes one permit from the gate, so tests
/// decide when items complete. The gate may apply to one cluster only.
pub struct RecordingResolver {
  gate: Option<Arc<Semaphore>>,
  gated_cluster: Option<String>,
  seen: Mutex<Vec<RectificationId>>,
}

impl RecordingResolver {
  pub fn instant() -> Arc<Self> {
    Arc::new(Self {
      gate: None,
      gated_cluster: None,
      seen: Mutex::new(Vec::new()),
    })
  }

  pub fn gated(cluster: Option<&str>) -> (Arc<Self>, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let resolver = Arc::new(Self {
      gate: Some(Arc::clone(&gate)),
      gated_cluster: cluster.map(str::to_string),
      seen: Mutex::new(Vec::new()),
    });
    (resolver, gate)
  }

  pub fn seen(&self) -> Vec<RectificationId> {
    self.seen.lock().unwrap().clone()
  }
}

#[async_trait]
impl Resolver for RecordingResolver {
  async fn resolve(&self, queued: &QueuedRectification) -> Resolution {
    let applies = match &self.gated_cluster {
      Some(cluster) => &queued.target().cluster == cluster,
      None => true,
    };
    if applies && let Some(gate) = &self.gate {
      gate.acquire().await.unwrap().forget();
    }

    self.seen.lock().unwrap().push(queued.id.clone());
    Resolution::succeeded(
      queued.target().clone(),
      ResolutionKind::intended(&queued.rectification),
      queued.rectification.post.clone(),
    )
  }
}

/// Panics on rectifications whose desired version matches, and succeeds otherwise.
pub struct PanickingResolver {
  bad_version: String,
}

impl PanickingResolver {
  pub fn new(bad_version: &str) -> Self {
    Self {
      bad_version: bad_version.to_string(),
    }
  }
}

#[async_trait]
impl Resolver for PanickingResolver {
  async fn resolve(&self, queued: &QueuedRectification) -> Resolution {
    let version = queued.rectification.post.as_ref().map(|p| p.deployment.spec.version.as_str());
    if version == Some(self.bad_version.as_str()) {
      panic!("resolver blew up");
    }
    Resolution::succeeded(queued.target().clone(), ResolutionKind::intended(&queued.rectification), None)
  }
}

/// Fails every item with a retryable error.
pub struct FailingResolver;

#[async_trait]
impl Resolver for FailingResolver {
  async fn resolve(&self, queued: &QueuedRectification) -> Resolution {
    Resolution::failed(
      queued.target().clone(),
      ResolutionKind::intended(&queued.rectification),
      ResolutionError::retryable("cluster unavailable"),
    )
  }
}
