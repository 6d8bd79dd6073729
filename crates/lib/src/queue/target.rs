//! A single target's FIFO of rectifications.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::info;

use crate::gdm::{DeploymentTargetId, Rectification};

use super::types::{QueuedRectification, RectificationId, Resolution};

/// One queued item. The resolution is published once through the watch
/// channel; every waiter subscribes to it.
pub(crate) struct Slot {
  pub(crate) id: RectificationId,
  pub(crate) rectification: Rectification,
  assigned_pos: usize,
  outcome: watch::Sender<Option<Resolution>>,
}

impl Slot {
  fn new(rectification: Rectification, assigned_pos: usize) -> Self {
    let (outcome, _) = watch::channel(None);
    Self {
      id: RectificationId::generate(),
      rectification,
      assigned_pos,
      outcome,
    }
  }

  fn snapshot(&self, pos: usize) -> QueuedRectification {
    QueuedRectification {
      id: self.id.clone(),
      pos,
      rectification: self.rectification.clone(),
      resolution: self.outcome.borrow().clone(),
    }
  }
}

#[derive(Default)]
struct QueueState {
  /// Unresolved items, oldest first. The head stays here while it is being
  /// processed and is removed only once its resolution is recorded.
  pending: VecDeque<Arc<Slot>>,
  /// Resolved items, oldest first, bounded by the queue's retention.
  completed: VecDeque<Arc<Slot>>,
  worker_active: bool,
}

/// A [`TargetQueue`] whose contents cannot change while this is alive.
pub(crate) struct HeldQueue<'a>(MutexGuard<'a, QueueState>);

impl HeldQueue<'_> {
  pub(crate) fn len(&self) -> usize {
    self.0.pending.len()
  }
}

/// Rectifications waiting for (or being applied to) one deployment target.
pub struct TargetQueue {
  target: DeploymentTargetId,
  retention: usize,
  state: Mutex<QueueState>,
}

impl TargetQueue {
  pub(crate) fn new(target: DeploymentTargetId, retention: usize) -> Self {
    Self {
      target,
      retention,
      state: Mutex::new(QueueState::default()),
    }
  }

  fn state(&self) -> MutexGuard<'_, QueueState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn target(&self) -> &DeploymentTargetId {
    &self.target
  }

  /// Number of unresolved items, including one currently being processed.
  pub fn len(&self) -> usize {
    self.state().pending.len()
  }

  /// Locks the queue against pushes and completions until the guard drops.
  pub(crate) fn hold(&self) -> HeldQueue<'_> {
    HeldQueue(self.state())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Whether a worker is currently draining this queue.
  pub fn is_active(&self) -> bool {
    self.state().worker_active
  }

  /// Unresolved items in processing order, each with its current position.
  pub fn snapshot(&self) -> Vec<QueuedRectification> {
    let state = self.state();
    state
      .pending
      .iter()
      .enumerate()
      .map(|(pos, slot)| slot.snapshot(pos))
      .collect()
  }

  /// Recently resolved items, oldest first.
  pub fn completed(&self) -> Vec<QueuedRectification> {
    let state = self.state();
    state
      .completed
      .iter()
      .map(|slot| slot.snapshot(slot.assigned_pos))
      .collect()
  }

  /// Looks up an item, pending or retained after resolution.
  pub fn get(&self, id: &RectificationId) -> Option<QueuedRectification> {
    let state = self.state();
    if let Some(pos) = state.pending.iter().position(|slot| &slot.id == id) {
      return Some(state.pending[pos].snapshot(pos));
    }
    state
      .completed
      .iter()
      .find(|slot| &slot.id == id)
      .map(|slot| slot.snapshot(slot.assigned_pos))
  }

  pub(crate) fn subscribe(&self, id: &RectificationId) -> Option<watch::Receiver<Option<Resolution>>> {
    let state = self.state();
    state
      .pending
      .iter()
      .chain(state.completed.iter())
      .find(|slot| &slot.id == id)
      .map(|slot| slot.outcome.subscribe())
  }

  /// Appends an item. With `only_if_empty`, nothing is added unless the
  /// queue has no unresolved items.
  ///
  /// Returns the queued snapshot and whether the caller must start a worker.
  pub(crate) fn enqueue(&self, rectification: Rectification, only_if_empty: bool) -> Option<(QueuedRectification, bool)> {
    let mut state = self.state();
    if only_if_empty && !state.pending.is_empty() {
      return None;
    }

    let pos = state.pending.len();
    let slot = Arc::new(Slot::new(rectification, pos));
    let queued = slot.snapshot(pos);
    state.pending.push_back(slot);

    let start_worker = !state.worker_active;
    state.worker_active = true;
    Some((queued, start_worker))
  }

  /// The item the worker should process next. When none is left the worker
  /// is marked idle under the same lock, so a concurrent push starts a new one.
  pub(crate) fn next_or_idle(&self) -> Option<Arc<Slot>> {
    let mut state = self.state();
    match state.pending.front() {
      Some(slot) => Some(Arc::clone(slot)),
      None => {
        state.worker_active = false;
        None
      }
    }
  }

  /// Records the resolution of the head item and moves it to the completed list.
  pub(crate) fn complete(&self, slot: &Arc<Slot>, resolution: Resolution) {
    let mut state = self.state();
    if let Some(pos) = state.pending.iter().position(|s| Arc::ptr_eq(s, slot)) {
      state.pending.remove(pos);
    }

    info!(
      target_id = %self.target,
      id = %slot.id,
      kind = %resolution.kind,
      ok = resolution.is_success(),
      "rectification resolved"
    );
    slot.outcome.send_replace(Some(resolution));

    state.completed.push_back(Arc::clone(slot));
    while state.completed.len() > self.retention {
      state.completed.pop_front();
    }
  }
}

impl std::fmt::Debug for TargetQueue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TargetQueue")
      .field("target", &self.target)
      .field("len", &self.len())
      .finish()
  }
}
