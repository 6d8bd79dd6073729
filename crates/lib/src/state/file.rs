//! File-backed GDM store.
//!
//! # Storage Layout
//!
//! ```text
//! {dir}/
//! ├── gdm.json        # current GDM
//! ├── gdm.json.lock   # writer lock (see `StoreLock`)
//! └── gdm.json.log    # one JSON line per accepted write
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::gdm::{Gdm, User};

use super::lock::StoreLock;
use super::{Revision, StateRead, StateStore, StoreError, revision_of};

/// One line of the write log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRecord {
  pub revision: Revision,
  pub based_on: Revision,
  pub user: User,
  pub at_unix: u64,
}

/// Stores the GDM as pretty-printed JSON in a single file.
///
/// A missing file reads as an empty GDM. Writes hold an exclusive
/// [`StoreLock`] while comparing revisions and replacing the file, and replace
/// it atomically (write to temp, then rename).
#[derive(Debug, Clone)]
pub struct FileStateStore {
  path: PathBuf,
}

impl FileStateStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn sidecar(&self, suffix: &str) -> PathBuf {
    let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    self.path.with_file_name(name)
  }

  fn lock_path(&self) -> PathBuf {
    self.sidecar(".lock")
  }

  fn log_path(&self) -> PathBuf {
    self.sidecar(".log")
  }

  fn load(&self) -> Result<Gdm, StoreError> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Gdm::default()),
      Err(e) => return Err(StoreError::Read(e)),
    };
    serde_json::from_str(&content).map_err(StoreError::Parse)
  }

  fn append_log(&self, record: &WriteRecord) -> Result<(), StoreError> {
    let mut line = serde_json::to_vec(record).map_err(StoreError::Serialize)?;
    line.push(b'\n');
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(self.log_path())
      .map_err(StoreError::Write)?;
    file.write_all(&line).map_err(StoreError::Write)
  }

  /// Every accepted write, oldest first.
  pub fn history(&self) -> Result<Vec<WriteRecord>, StoreError> {
    let content = match fs::read_to_string(self.log_path()) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(StoreError::Read(e)),
    };
    content
      .lines()
      .filter(|line| !line.trim().is_empty())
      .map(|line| serde_json::from_str(line).map_err(StoreError::Parse))
      .collect()
  }
}

impl StateStore for FileStateStore {
  fn read(&self) -> Result<StateRead, StoreError> {
    let gdm = self.load()?;
    let revision = revision_of(&gdm)?;
    debug!(path = %self.path.display(), revision = %revision, "read gdm");
    Ok(StateRead { gdm, revision })
  }

  fn write(&self, gdm: &Gdm, based_on: &Revision, actor: &User) -> Result<Revision, StoreError> {
    if let Some(dir) = self.path.parent()
      && !dir.as_os_str().is_empty()
    {
      fs::create_dir_all(dir).map_err(StoreError::CreateDir)?;
    }

    let _lock = StoreLock::try_acquire(&self.lock_path(), actor)?;

    let actual = revision_of(&self.load()?)?;
    if &actual != based_on {
      return Err(StoreError::Conflict {
        expected: based_on.clone(),
        actual,
      });
    }

    let temp_path = self.sidecar(".tmp");
    let content = serde_json::to_string_pretty(gdm).map_err(StoreError::Serialize)?;
    fs::write(&temp_path, &content).map_err(StoreError::Write)?;
    fs::rename(&temp_path, &self.path).map_err(StoreError::Write)?;

    let revision = revision_of(gdm)?;
    self.append_log(&WriteRecord {
      revision: revision.clone(),
      based_on: based_on.clone(),
      user: actor.clone(),
      at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    })?;

    info!(
      path = %self.path.display(),
      user = %actor.name,
      revision = %revision,
      deployments = gdm.deployments.len(),
      "stored gdm"
    );

    Ok(revision)
  }
}
