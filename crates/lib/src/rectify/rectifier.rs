use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::gdm::{DeployStatus, Deployable, Deployment, DeploymentTargetId, Rectification};
use crate::queue::{QueuedRectification, Resolution, ResolutionError, ResolutionKind, Resolver};
use crate::state::{StateStore, StoreError};

use super::{ClusterInventory, DeployError, Deployer};

/// Passes over one target before giving up on writes that keep landing.
const CONVERGE_ROUNDS: usize = 4;

/// Resolves rectifications by calling a [`Deployer`].
///
/// Prior absent and post present creates, the reverse deletes, and two
/// differing sides modify. Equal sides need no call.
///
/// With [`Rectifier::converging`] the queued sides are only a record of what
/// was asked: each run re-reads the GDM and the cluster, applies the gap it
/// finds, and repeats until a fresh read shows nothing left to do.
pub struct Rectifier<D: ?Sized> {
  deployer: Arc<D>,
  current: Option<CurrentState>,
}

struct CurrentState {
  store: Arc<dyn StateStore>,
  inventory: Arc<dyn ClusterInventory>,
}

impl CurrentState {
  /// The gap between the GDM and the cluster for `target`, as of now.
  async fn gap(&self, target: &DeploymentTargetId) -> Result<Rectification, DeployError> {
    let store = Arc::clone(&self.store);
    let state = tokio::task::spawn_blocking(move || store.read())
      .await
      .map_err(StoreError::from)
      .and_then(|read| read)
      .map_err(|e| DeployError::Unavailable(format!("desired state unreadable: {e}")))?;
    let desired = state
      .gdm
      .deployments
      .get(target)
      .map(|spec| Deployable::new(Deployment::new(target.clone(), spec.clone()), DeployStatus::Active));

    let actual = self
      .inventory
      .deployments(&target.cluster)
      .await?
      .into_iter()
      .find(|d| d.id() == target);

    Ok(Rectification::new(target.clone(), actual, desired))
  }
}

impl<D: Deployer + ?Sized> Rectifier<D> {
  pub fn new(deployer: Arc<D>) -> Self {
    Self {
      deployer,
      current: None,
    }
  }

  /// Resolves against the current GDM in `store` and what `inventory`
  /// reports, instead of the sides recorded at queue time.
  pub fn converging(mut self, store: Arc<dyn StateStore>, inventory: Arc<dyn ClusterInventory>) -> Self {
    self.current = Some(CurrentState { store, inventory });
    self
  }

  async fn apply(&self, rectification: &Rectification, kind: ResolutionKind) -> Result<Option<Deployable>, DeployError> {
    match (&rectification.prior, &rectification.post) {
      (None, Some(post)) => self.deployer.create(post).await.map(Some),
      (Some(prior), None) => self.deployer.delete(prior).await.map(|()| None),
      (Some(prior), Some(post)) if kind == ResolutionKind::Modify => self.deployer.modify(prior, post).await.map(Some),
      (prior, post) => Ok(prior.clone().or_else(|| post.clone())),
    }
  }

  async fn converge(&self, current: &CurrentState, queued: &QueuedRectification) -> Resolution {
    let target = queued.target();
    let mut settled: Option<Resolution> = None;

    for round in 0..CONVERGE_ROUNDS {
      let gap = match current.gap(target).await {
        Ok(gap) => gap,
        Err(e) => return failed(queued, ResolutionKind::intended(&queued.rectification), e),
      };
      let kind = ResolutionKind::intended(&gap);
      if kind == ResolutionKind::Unchanged {
        return settled.unwrap_or_else(|| {
          debug!(target_id = %target, id = %queued.id, "already converged");
          Resolution::succeeded(target.clone(), kind, gap.prior.or(gap.post))
        });
      }
      if round > 0 {
        debug!(target_id = %target, id = %queued.id, round, "desired state moved, converging again");
      }
      match self.apply(&gap, kind).await {
        Ok(deploy_state) => {
          info!(target_id = %target, id = %queued.id, kind = %kind, "rectified");
          settled = Some(Resolution::succeeded(target.clone(), kind, deploy_state));
        }
        Err(e) => return failed(queued, kind, e),
      }
    }

    warn!(target_id = %target, id = %queued.id, "still not converged, leaving the rest to the next rectification");
    settled.unwrap_or_else(|| Resolution::succeeded(target.clone(), ResolutionKind::Unchanged, None))
  }
}

fn failed(queued: &QueuedRectification, kind: ResolutionKind, e: DeployError) -> Resolution {
  warn!(target_id = %queued.target(), id = %queued.id, kind = %kind, error = %e, "rectification failed");
  let error = ResolutionError {
    message: e.to_string(),
    retryable: e.is_retryable(),
  };
  Resolution::failed(queued.target().clone(), kind, error)
}

#[async_trait]
impl<D: Deployer + ?Sized> Resolver for Rectifier<D> {
  async fn resolve(&self, queued: &QueuedRectification) -> Resolution {
    if let Some(current) = &self.current {
      return self.converge(current, queued).await;
    }

    let rectification = &queued.rectification;
    let kind = ResolutionKind::intended(rectification);
    match self.apply(rectification, kind).await {
      Ok(deploy_state) => {
        info!(target_id = %queued.target(), id = %queued.id, kind = %kind, "rectified");
        Resolution::succeeded(queued.target().clone(), kind, deploy_state)
      }
      Err(e) => failed(queued, kind, e),
    }
  }
}
