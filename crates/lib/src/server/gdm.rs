//! `/gdm` and `/single-deployment`.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use tracing::{info, warn};

use crate::gdm::{DeployStatus, DeploySpec, Deployable, Deployment, DeploymentTargetId, Gdm, Rectification};
use crate::queue::QueuedRectification;

use super::conditional::{self, GdmResource};
use super::wire::TargetQuery;
use super::{ApiError, AppContext, item_location, user_from_headers};

/// The whole GDM. Always exists.
pub struct WholeGdm;

impl GdmResource for WholeGdm {
  type Value = Gdm;

  fn describe(&self) -> String {
    "gdm".to_string()
  }

  fn extract(&self, gdm: &Gdm) -> Option<Gdm> {
    Some(gdm.clone())
  }

  fn install(&self, gdm: &mut Gdm, value: Gdm) -> Result<(), ApiError> {
    *gdm = value;
    Ok(())
  }
}

/// The spec of one deployment target.
pub struct SingleDeployment {
  pub target: DeploymentTargetId,
}

impl GdmResource for SingleDeployment {
  type Value = DeploySpec;

  fn describe(&self) -> String {
    format!("deployment {}", self.target)
  }

  fn extract(&self, gdm: &Gdm) -> Option<DeploySpec> {
    gdm.deployments.get(&self.target).cloned()
  }

  fn install(&self, gdm: &mut Gdm, value: DeploySpec) -> Result<(), ApiError> {
    gdm.deployments.insert(Deployment::new(self.target.clone(), value));
    Ok(())
  }
}

pub async fn get_gdm(State(ctx): State<AppContext>) -> Result<Response, ApiError> {
  let served = conditional::read(&ctx, &WholeGdm).await?;
  Ok(served.into_response_with(StatusCode::OK))
}

pub async fn put_gdm(State(ctx): State<AppContext>, headers: HeaderMap, body: Bytes) -> Result<Response, ApiError> {
  let user = user_from_headers(&headers);
  let updated = conditional::update(&ctx, &WholeGdm, &headers, &body, &user).await?;
  Ok(updated.served.into_response_with(StatusCode::OK))
}

fn target_from(query: TargetQuery) -> Result<DeploymentTargetId, ApiError> {
  let target = DeploymentTargetId::from(query);
  target.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
  Ok(target)
}

pub async fn get_single(State(ctx): State<AppContext>, Query(query): Query<TargetQuery>) -> Result<Response, ApiError> {
  let resource = SingleDeployment {
    target: target_from(query)?,
  };
  let served = conditional::read(&ctx, &resource).await?;
  Ok(served.into_response_with(StatusCode::OK))
}

/// Creates or updates one deployment, then queues its rectification.
///
/// Answers 202 with a `Location` naming the rectification that will carry the
/// change: the one just queued, or the one already outstanding for the target.
/// Either re-reads the GDM when it runs, so it deploys this write or a later one.
pub async fn put_single(
  State(ctx): State<AppContext>,
  Query(query): Query<TargetQuery>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Response, ApiError> {
  let resource = SingleDeployment {
    target: target_from(query)?,
  };
  let user = user_from_headers(&headers);
  let updated = conditional::update(&ctx, &resource, &headers, &body, &user).await?;

  let desired = Deployable::new(
    Deployment::new(resource.target.clone(), updated.value),
    DeployStatus::Active,
  );
  let queued = queue_rectification(&ctx, desired).await;

  let mut response = updated.served.into_response_with(StatusCode::ACCEPTED);
  if let Some(queued) = queued
    && let Ok(location) = HeaderValue::from_str(&item_location(&resource.target, &queued.id))
  {
    response.headers_mut().insert(header::LOCATION, location);
  }
  Ok(response)
}

/// Queues the rectification converging `desired`'s target, unless one is
/// already outstanding, and returns whichever now stands for it.
async fn queue_rectification(ctx: &AppContext, desired: Deployable) -> Option<QueuedRectification> {
  let target = desired.id().clone();
  let actual = match ctx.inventory.deployments(&target.cluster).await {
    Ok(deployed) => deployed.into_iter().find(|d| d.id() == &target),
    Err(e) => {
      warn!(target_id = %target, error = %e, "could not read cluster, rectification not queued");
      return None;
    }
  };

  let rectification = Rectification::new(target.clone(), actual, Some(desired));
  match ctx.queues.push_if_empty(rectification) {
    Some(queued) => {
      info!(target_id = %target, id = %queued.id, "queued rectification");
      Some(queued)
    }
    None => ctx
      .queues
      .queue(&target)
      .and_then(|queue| queue.snapshot().into_iter().last()),
  }
}
