//! Turning rectifications into changes on clusters.
//!
//! - [`Rectifier`]: the [`Resolver`](crate::queue::Resolver) handed to the queue set
//! - [`Deployer`] / [`ClusterInventory`]: the cluster scheduler seen from convoy
//! - [`MemoryCluster`]: an in-process scheduler for local servers and tests
//! - [`gather_deployments`] / [`pair_deployments`]: desired vs. actual
//! - [`auto_resolve`]: one full convergence pass over the GDM

mod auto;
mod gather;
mod memory;
mod rectifier;

use async_trait::async_trait;
use thiserror::Error;

use crate::gdm::{Deployable, DeploymentTargetId};

pub use auto::{AutoResolveReport, auto_resolve, spawn_auto_resolver};
pub use gather::{ClusterDeployments, gather_deployments, pair_deployments};
pub use memory::MemoryCluster;
pub use rectifier::Rectifier;

#[derive(Debug, Error)]
pub enum DeployError {
  #[error("deployment not found: {0}")]
  NotFound(DeploymentTargetId),

  #[error("deployment already exists: {0}")]
  AlreadyExists(DeploymentTargetId),

  #[error("cluster unavailable: {0}")]
  Unavailable(String),
}

impl DeployError {
  /// Whether the same request may succeed later.
  pub fn is_retryable(&self) -> bool {
    matches!(self, DeployError::Unavailable(_))
  }
}

/// Applies deployment changes to a cluster scheduler.
#[async_trait]
pub trait Deployer: Send + Sync + 'static {
  /// Starts a new deployment and returns it as now running.
  async fn create(&self, post: &Deployable) -> Result<Deployable, DeployError>;

  /// Replaces a running deployment with `post`.
  async fn modify(&self, prior: &Deployable, post: &Deployable) -> Result<Deployable, DeployError>;

  async fn delete(&self, prior: &Deployable) -> Result<(), DeployError>;
}

/// Reports what is actually deployed.
#[async_trait]
pub trait ClusterInventory: Send + Sync + 'static {
  async fn deployments(&self, cluster: &str) -> Result<Vec<Deployable>, DeployError>;
}
