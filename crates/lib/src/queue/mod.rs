//! Rectification queueing.
//!
//! Changes to desired state are turned into [`Rectification`](crate::gdm::Rectification)s
//! and pushed onto a per-target queue in a [`QueueSet`]. Each queue is drained
//! by a dedicated worker which hands items, one at a time and in push order,
//! to a [`Resolver`]. Callers follow progress by id through
//! [`QueueSet::wait`] or the queue snapshots.

mod set;
mod target;
mod types;

use async_trait::async_trait;

pub use set::QueueSet;
pub use target::TargetQueue;
pub use types::{QueuedRectification, RectificationId, Resolution, ResolutionError, ResolutionKind};

/// Applies a rectification to the world and reports what happened.
///
/// Failures are reported inside the returned [`Resolution`]. A panic is
/// caught by the queue worker and recorded as a failed resolution.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
  async fn resolve(&self, queued: &QueuedRectification) -> Resolution;
}
