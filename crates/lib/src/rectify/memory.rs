use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::gdm::{DeployStatus, Deployable, DeploymentTargetId};

use super::{ClusterInventory, DeployError, Deployer};

#[derive(Debug, Default)]
struct ClusterState {
  deployments: BTreeMap<DeploymentTargetId, Deployable>,
  offline: BTreeSet<String>,
}

/// An in-process stand-in for a cluster scheduler.
///
/// Any cluster name is accepted; a cluster exists once something is deployed
/// to it. A cluster marked offline fails every call with a retryable error.
#[derive(Debug, Default)]
pub struct MemoryCluster {
  state: Mutex<ClusterState>,
}

impl MemoryCluster {
  fn state(&self) -> MutexGuard<'_, ClusterState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Places a deployment directly, bypassing the offline check.
  pub fn insert(&self, deployable: Deployable) {
    self.state().deployments.insert(deployable.id().clone(), deployable);
  }

  pub fn get(&self, id: &DeploymentTargetId) -> Option<Deployable> {
    self.state().deployments.get(id).cloned()
  }

  pub fn set_offline(&self, cluster: &str, offline: bool) {
    let mut state = self.state();
    if offline {
      state.offline.insert(cluster.to_string());
    } else {
      state.offline.remove(cluster);
    }
  }

  fn check_online(state: &ClusterState, cluster: &str) -> Result<(), DeployError> {
    if state.offline.contains(cluster) {
      return Err(DeployError::Unavailable(cluster.to_string()));
    }
    Ok(())
  }
}

fn running(deployable: &Deployable) -> Deployable {
  Deployable::new(deployable.deployment.clone(), DeployStatus::Active)
}

#[async_trait]
impl Deployer for MemoryCluster {
  async fn create(&self, post: &Deployable) -> Result<Deployable, DeployError> {
    let mut state = self.state();
    Self::check_online(&state, &post.id().cluster)?;
    if state.deployments.contains_key(post.id()) {
      return Err(DeployError::AlreadyExists(post.id().clone()));
    }
    let deployed = running(post);
    state.deployments.insert(post.id().clone(), deployed.clone());
    debug!(target_id = %post.id(), version = %post.deployment.spec.version, "created deployment");
    Ok(deployed)
  }

  async fn modify(&self, prior: &Deployable, post: &Deployable) -> Result<Deployable, DeployError> {
    let mut state = self.state();
    Self::check_online(&state, &post.id().cluster)?;
    if !state.deployments.contains_key(prior.id()) {
      return Err(DeployError::NotFound(prior.id().clone()));
    }
    let deployed = running(post);
    state.deployments.insert(post.id().clone(), deployed.clone());
    debug!(target_id = %post.id(), version = %post.deployment.spec.version, "modified deployment");
    Ok(deployed)
  }

  async fn delete(&self, prior: &Deployable) -> Result<(), DeployError> {
    let mut state = self.state();
    Self::check_online(&state, &prior.id().cluster)?;
    state
      .deployments
      .remove(prior.id())
      .map(|_| ())
      .ok_or_else(|| DeployError::NotFound(prior.id().clone()))
  }
}

#[async_trait]
impl ClusterInventory for MemoryCluster {
  async fn deployments(&self, cluster: &str) -> Result<Vec<Deployable>, DeployError> {
    let state = self.state();
    Self::check_online(&state, cluster)?;
    Ok(
      state
        .deployments
        .values()
        .filter(|d| d.id().cluster == cluster)
        .cloned()
        .collect(),
    )
  }
}
