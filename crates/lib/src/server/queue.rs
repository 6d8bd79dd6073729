//! Read-only views of the queue set, and on-demand convergence.

use std::time::Duration;

use axum::Json;
use axum::extract::{Query, State};

use crate::queue::{QueuedRectification, RectificationId};
use crate::rectify::{AutoResolveReport, auto_resolve};

use super::wire::{ItemQuery, QueueResponse, QueueSummary, QueuesResponse, TargetQuery};
use super::{ApiError, AppContext};

/// `GET /deployqueues`: every known target and its queue length.
pub async fn list_queues(State(ctx): State<AppContext>) -> Json<QueuesResponse> {
  let queues = ctx
    .queues
    .lengths()
    .into_iter()
    .map(|(target, length)| QueueSummary { length, target })
    .collect();
  Json(QueuesResponse { queues })
}

/// `GET /deployqueue`: pending items of one target, head first.
pub async fn get_queue(
  State(ctx): State<AppContext>,
  Query(query): Query<TargetQuery>,
) -> Result<Json<QueueResponse>, ApiError> {
  let target = query.into();
  let queue = ctx
    .queues
    .queue(&target)
    .ok_or_else(|| ApiError::NotFound(format!("no queue for {target}")))?;
  Ok(Json(QueueResponse {
    queue: queue.snapshot(),
    target,
  }))
}

/// `GET /deployqueue/item`: one item by id, optionally waiting for its resolution.
///
/// A wait that runs out answers with the item as it stands, unresolved.
pub async fn get_item(
  State(ctx): State<AppContext>,
  Query(query): Query<ItemQuery>,
) -> Result<Json<QueuedRectification>, ApiError> {
  let target = query.target();
  let id = RectificationId(query.id.clone());
  let not_found = || ApiError::NotFound(format!("no rectification {id} for {target}"));

  let queue = ctx.queues.queue(&target).ok_or_else(not_found)?;
  let item = queue.get(&id).ok_or_else(not_found)?;
  if !query.wait || item.is_resolved() {
    return Ok(Json(item));
  }

  let timeout = match query.timeout_secs {
    Some(secs) => Duration::from_secs(secs).min(ctx.config.wait_timeout()),
    None => ctx.config.wait_timeout(),
  };
  let resolution = ctx.queues.wait(&target, &id, timeout).await;

  let current = match queue.get(&id) {
    Some(current) => current,
    None => QueuedRectification { resolution, ..item },
  };
  Ok(Json(current))
}

/// `POST /rectify-all`: one convergence pass over every cluster.
pub async fn rectify_all(State(ctx): State<AppContext>) -> Result<Json<AutoResolveReport>, ApiError> {
  Ok(Json(auto_resolve(&ctx).await?))
}
