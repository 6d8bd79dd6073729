//! Backing store for the GDM.
//!
//! The store is the single place shared desired state lives. It offers one
//! read and one compare-and-write: every write names the [`Revision`] it was
//! based on, and is rejected with a retryable [`StoreError::Conflict`] when
//! another writer got there first.
//!
//! Two implementations are provided:
//! - [`MemoryStateStore`]: process-local, for tests and ephemeral servers
//! - [`FileStateStore`]: JSON on disk, safe across processes via [`lock::StoreLock`]

pub mod file;
pub mod lock;
pub mod memory;

use std::io;

use thiserror::Error;

use crate::gdm::{Gdm, User};
use crate::util::hash::Fingerprint;

pub use file::FileStateStore;
pub use lock::{LockHolder, StoreLock, StoreLockError};
pub use memory::MemoryStateStore;

/// Version of the stored GDM; the fingerprint of its canonical bytes.
pub type Revision = Fingerprint;

/// Result of reading the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRead {
  pub gdm: Gdm,
  pub revision: Revision,
}

/// Errors that can occur when reading or writing the store.
#[derive(Debug, Error)]
pub enum StoreError {
  /// The stored state moved on since the caller read it.
  #[error("state changed concurrently: expected revision {expected}, found {actual}")]
  Conflict { expected: Revision, actual: Revision },

  /// Another process holds the store lock.
  #[error(transparent)]
  Locked(#[from] StoreLockError),

  #[error("failed to read state: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write state: {0}")]
  Write(#[source] io::Error),

  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to parse state: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("store task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl StoreError {
  /// True for races with other writers; the caller may redo its read-merge-write.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      StoreError::Conflict { .. } | StoreError::Locked(StoreLockError::Held { .. })
    )
  }
}

/// The declarative-state store collaborator.
///
/// Implementations are synchronous; async callers run them on the blocking pool.
pub trait StateStore: Send + Sync + 'static {
  fn read(&self) -> Result<StateRead, StoreError>;

  /// Replace the GDM if the stored revision still equals `based_on`.
  ///
  /// Returns the revision of the newly stored state.
  fn write(&self, gdm: &Gdm, based_on: &Revision, actor: &User) -> Result<Revision, StoreError>;
}

pub(crate) fn revision_of(gdm: &Gdm) -> Result<Revision, StoreError> {
  use crate::util::hash::Fingerprinted;
  gdm.fingerprint().map_err(StoreError::Serialize)
}
