//! In-memory GDM store.

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::gdm::{Gdm, User};

use super::{Revision, StateRead, StateStore, StoreError, revision_of};

/// Process-local store. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
  gdm: Mutex<Gdm>,
}

impl MemoryStateStore {
  pub fn new(gdm: Gdm) -> Self {
    Self { gdm: Mutex::new(gdm) }
  }
}

impl StateStore for MemoryStateStore {
  fn read(&self) -> Result<StateRead, StoreError> {
    let gdm = self.gdm.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let revision = revision_of(&gdm)?;
    Ok(StateRead { gdm, revision })
  }

  fn write(&self, gdm: &Gdm, based_on: &Revision, actor: &User) -> Result<Revision, StoreError> {
    let mut current = self.gdm.lock().unwrap_or_else(PoisonError::into_inner);
    let actual = revision_of(&current)?;
    if &actual != based_on {
      return Err(StoreError::Conflict {
        expected: based_on.clone(),
        actual,
      });
    }

    *current = gdm.clone();
    let revision = revision_of(&current)?;
    debug!(user = %actor.name, revision = %revision, "stored gdm in memory");
    Ok(revision)
  }
}
