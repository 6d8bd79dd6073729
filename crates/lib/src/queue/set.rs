use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::consts::DEFAULT_QUEUE_RETENTION;
use crate::gdm::{DeploymentTargetId, Rectification};

use super::Resolver;
use super::target::TargetQueue;
use super::types::{QueuedRectification, RectificationId, Resolution, ResolutionError, ResolutionKind};

struct Inner {
  queues: Mutex<BTreeMap<DeploymentTargetId, Arc<TargetQueue>>>,
  resolver: Arc<dyn Resolver>,
  retention: usize,
  closed: AtomicBool,
}

/// Per-target FIFO queues of rectifications, each drained by its own worker.
///
/// Items for one target are resolved strictly in push order, one at a time.
/// Different targets progress independently. Cloning yields another handle
/// to the same set.
///
/// Pushing spawns workers and must happen inside a Tokio runtime.
#[derive(Clone)]
pub struct QueueSet {
  inner: Arc<Inner>,
}

impl QueueSet {
  pub fn new(resolver: Arc<dyn Resolver>) -> Self {
    Self::with_retention(resolver, DEFAULT_QUEUE_RETENTION)
  }

  /// `retention` bounds how many resolved items each queue keeps for lookup.
  pub fn with_retention(resolver: Arc<dyn Resolver>, retention: usize) -> Self {
    Self {
      inner: Arc::new(Inner {
        queues: Mutex::new(BTreeMap::new()),
        resolver,
        retention,
        closed: AtomicBool::new(false),
      }),
    }
  }

  fn queues_guard(&self) -> MutexGuard<'_, BTreeMap<DeploymentTargetId, Arc<TargetQueue>>> {
    self.inner.queues.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Appends a rectification to its target's queue.
  ///
  /// Returns `None` only after [`QueueSet::shutdown`].
  pub fn push(&self, rectification: Rectification) -> Option<QueuedRectification> {
    self.enqueue(rectification, false)
  }

  /// Appends a rectification only if its target has nothing unresolved queued.
  ///
  /// The check and the append are atomic with respect to other pushes.
  pub fn push_if_empty(&self, rectification: Rectification) -> Option<QueuedRectification> {
    self.enqueue(rectification, true)
  }

  fn enqueue(&self, rectification: Rectification, only_if_empty: bool) -> Option<QueuedRectification> {
    if self.is_shut_down() {
      warn!(target_id = %rectification.target, "queue set is shut down, dropping rectification");
      return None;
    }

    let queue = {
      let mut queues = self.queues_guard();
      let retention = self.inner.retention;
      Arc::clone(
        queues
          .entry(rectification.target.clone())
          .or_insert_with(|| Arc::new(TargetQueue::new(rectification.target.clone(), retention))),
      )
    };

    let (queued, start_worker) = queue.enqueue(rectification, only_if_empty)?;
    debug!(target_id = %queued.target(), id = %queued.id, pos = queued.pos, "rectification queued");

    if start_worker {
      tokio::spawn(drain(queue, Arc::clone(&self.inner.resolver)));
    }
    Some(queued)
  }

  /// Every queue created so far, keyed by target.
  ///
  /// The handles are live: each reflects its queue at the moment it is read.
  /// Use [`QueueSet::lengths`] for a consistent view across targets.
  pub fn queues(&self) -> BTreeMap<DeploymentTargetId, Arc<TargetQueue>> {
    self.queues_guard().clone()
  }

  /// Unresolved items per target, all taken at one instant.
  ///
  /// Every queue is held until the last length is read, so no push or
  /// completion lands in between.
  pub fn lengths(&self) -> BTreeMap<DeploymentTargetId, usize> {
    let queues = self.queues_guard();
    let held: Vec<_> = queues.iter().map(|(target, queue)| (target, queue.hold())).collect();
    held.iter().map(|(target, queue)| ((*target).clone(), queue.len())).collect()
  }

  pub fn queue(&self, target: &DeploymentTargetId) -> Option<Arc<TargetQueue>> {
    self.queues_guard().get(target).cloned()
  }

  /// Waits up to `timeout` for an item's resolution.
  ///
  /// Returns immediately if the item is already resolved. Returns `None` if
  /// the item is unknown or the timeout elapses; waiting never consumes the
  /// resolution, so any number of callers may wait on the same item.
  pub async fn wait(&self, target: &DeploymentTargetId, id: &RectificationId, timeout: Duration) -> Option<Resolution> {
    let mut outcome = self.queue(target)?.subscribe(id)?;
    match tokio::time::timeout(timeout, outcome.wait_for(Option::is_some)).await {
      Ok(Ok(resolution)) => resolution.clone(),
      Ok(Err(_)) => None,
      Err(_) => {
        debug!(target_id = %target, id = %id, "wait timed out");
        None
      }
    }
  }

  /// Stops accepting pushes. Items already queued are still resolved.
  pub fn shutdown(&self) {
    self.inner.closed.store(true, Ordering::SeqCst);
  }

  pub fn is_shut_down(&self) -> bool {
    self.inner.closed.load(Ordering::SeqCst)
  }
}

impl std::fmt::Debug for QueueSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueueSet")
      .field("queues", &self.queues_guard().len())
      .field("retention", &self.inner.retention)
      .field("closed", &self.is_shut_down())
      .finish()
  }
}

/// Resolves a queue's items in order until it is empty.
async fn drain(queue: Arc<TargetQueue>, resolver: Arc<dyn Resolver>) {
  debug!(target_id = %queue.target(), "queue worker started");

  while let Some(slot) = queue.next_or_idle() {
    let queued = QueuedRectification {
      id: slot.id.clone(),
      pos: 0,
      rectification: slot.rectification.clone(),
      resolution: None,
    };

    // A separate task keeps a panicking resolver from taking the worker down.
    let task_resolver = Arc::clone(&resolver);
    let task_queued = queued.clone();
    let resolution = match tokio::spawn(async move { task_resolver.resolve(&task_queued).await }).await {
      Ok(resolution) => resolution,
      Err(e) => {
        error!(target_id = %queue.target(), id = %queued.id, error = %e, "rectification task failed");
        Resolution::failed(
          queued.target().clone(),
          ResolutionKind::intended(&queued.rectification),
          ResolutionError::new(format!("rectification aborted: {e}")),
        )
      }
    };

    queue.complete(&slot, resolution);
  }

  debug!(target_id = %queue.target(), "queue worker idle");
}
