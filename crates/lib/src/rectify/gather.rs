use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::gdm::{DeployStatus, Deployable, Deployment, DeploymentSet, DeploymentTargetId, Rectification};

use super::{ClusterInventory, DeployError};

/// What one cluster reported.
#[derive(Debug)]
pub struct ClusterDeployments {
  pub cluster: String,
  pub result: Result<Vec<Deployable>, DeployError>,
}

/// Queries every cluster for its deployments, at most `parallelism` at a time.
///
/// Results are ordered by cluster name. A cluster whose query task panicked
/// is logged and left out.
pub async fn gather_deployments(
  inventory: Arc<dyn ClusterInventory>,
  clusters: &BTreeSet<String>,
  parallelism: usize,
) -> Vec<ClusterDeployments> {
  let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
  let mut join_set = JoinSet::new();

  for cluster in clusters {
    let cluster = cluster.clone();
    let inventory = Arc::clone(&inventory);
    let semaphore = Arc::clone(&semaphore);

    join_set.spawn(async move {
      let result = match semaphore.acquire().await {
        Ok(_permit) => inventory.deployments(&cluster).await,
        Err(_) => Err(DeployError::Unavailable(cluster.clone())),
      };
      debug!(cluster = %cluster, ok = result.is_ok(), "gathered cluster deployments");
      ClusterDeployments { cluster, result }
    });
  }

  let mut gathered = Vec::with_capacity(clusters.len());
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(cluster) => gathered.push(cluster),
      Err(e) => error!(error = %e, "cluster query task panicked"),
    }
  }

  gathered.sort_by(|a, b| a.cluster.cmp(&b.cluster));
  gathered
}

/// Pairs desired with actual state into the rectifications that would
/// converge them, ordered by target. Targets already in agreement are skipped.
pub fn pair_deployments(desired: &DeploymentSet, actual: &[Deployable]) -> Vec<Rectification> {
  let mut pairs: BTreeMap<DeploymentTargetId, (Option<Deployable>, Option<Deployable>)> = BTreeMap::new();

  for (id, spec) in desired.iter() {
    let post = Deployable::new(Deployment::new(id.clone(), spec.clone()), DeployStatus::Active);
    pairs.entry(id.clone()).or_default().1 = Some(post);
  }
  for deployable in actual {
    pairs.entry(deployable.id().clone()).or_default().0 = Some(deployable.clone());
  }

  pairs
    .into_iter()
    .filter(|(_, (prior, post))| match (prior, post) {
      (Some(prior), Some(post)) => prior.deployment != post.deployment,
      _ => true,
    })
    .map(|(target, (prior, post))| Rectification::new(target, prior, post))
    .collect()
}
