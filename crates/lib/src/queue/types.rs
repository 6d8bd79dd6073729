//! Types for rectification queueing.

use serde::{Deserialize, Serialize};

use crate::gdm::{Deployable, DeploymentTargetId, Rectification};

/// Identifies a queued rectification. Unique for the lifetime of its target's queue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RectificationId(pub String);

impl RectificationId {
  pub fn generate() -> Self {
    Self(uuid::Uuid::new_v4().to_string())
  }
}

impl std::fmt::Display for RectificationId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for RectificationId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

/// What a rectification did (or would do) to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
  Create,
  Delete,
  Modify,
  /// Nothing to do; prior and post already agree.
  #[serde(rename = "none")]
  Unchanged,
}

impl ResolutionKind {
  /// The kind of change a rectification asks for.
  pub fn intended(rectification: &Rectification) -> Self {
    match (&rectification.prior, &rectification.post) {
      (None, Some(_)) => ResolutionKind::Create,
      (Some(_), None) => ResolutionKind::Delete,
      (Some(prior), Some(post)) if prior.deployment != post.deployment => ResolutionKind::Modify,
      _ => ResolutionKind::Unchanged,
    }
  }
}

impl std::fmt::Display for ResolutionKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      ResolutionKind::Create => "create",
      ResolutionKind::Delete => "delete",
      ResolutionKind::Modify => "modify",
      ResolutionKind::Unchanged => "none",
    };
    write!(f, "{}", s)
  }
}

/// Error recorded on a failed rectification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionError {
  pub message: String,
  /// Whether a later rectification of the same target may succeed.
  #[serde(default)]
  pub retryable: bool,
}

impl ResolutionError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      retryable: false,
    }
  }

  pub fn retryable(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      retryable: true,
    }
  }
}

impl std::fmt::Display for ResolutionError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message)
  }
}

/// Outcome of processing one queued rectification.
///
/// Written once by the draining worker, then immutable. A failed rectification
/// is still a terminal resolution: the failure lives in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
  pub target: DeploymentTargetId,
  pub kind: ResolutionKind,
  /// The deployable as left on the cluster, when known.
  pub deploy_state: Option<Deployable>,
  pub error: Option<ResolutionError>,
}

impl Resolution {
  pub fn succeeded(target: DeploymentTargetId, kind: ResolutionKind, deploy_state: Option<Deployable>) -> Self {
    Self {
      target,
      kind,
      deploy_state,
      error: None,
    }
  }

  pub fn failed(target: DeploymentTargetId, kind: ResolutionKind, error: ResolutionError) -> Self {
    Self {
      target,
      kind,
      deploy_state: None,
      error: Some(error),
    }
  }

  pub fn is_success(&self) -> bool {
    self.error.is_none()
  }
}

/// A rectification as held by a queue.
///
/// `pos` is the item's position among pending items when it was read (0 is
/// the item being or about to be processed); for completed items it is the
/// position it was assigned when pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRectification {
  pub id: RectificationId,
  pub pos: usize,
  pub rectification: Rectification,
  pub resolution: Option<Resolution>,
}

impl QueuedRectification {
  pub fn target(&self) -> &DeploymentTargetId {
    &self.rectification.target
  }

  pub fn is_resolved(&self) -> bool {
    self.resolution.is_some()
  }
}
