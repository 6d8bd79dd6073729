//! Writer lock for a state file shared between processes.
//!
//! Server replicas and CLIs may point at the same GDM file. A writer holds an
//! exclusive advisory lock on a sidecar file while it compares revisions and
//! replaces the state. Acquisition never blocks: a held lock comes back as
//! [`StoreLockError::Held`] so the caller can redo its whole read-merge-write.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gdm::User;

/// Who holds a writer lock; stored in the lock file while it is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub pid: u32,
  pub user: String,
  pub acquired_at_unix: u64,
}

impl std::fmt::Display for LockHolder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} (pid {}, since {})", self.user, self.pid, self.acquired_at_unix)
  }
}

#[derive(Debug, Error)]
pub enum StoreLockError {
  #[error("state file is being written by {}", holder.as_ref().map_or_else(|| "another process".to_string(), ToString::to_string))]
  Held { path: PathBuf, holder: Option<LockHolder> },

  #[error("failed to lock {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// An exclusive writer lock; released when dropped.
#[derive(Debug)]
pub struct StoreLock {
  file: File,
  path: PathBuf,
}

impl StoreLock {
  /// Takes the writer lock at `path` on behalf of `actor`, or reports who has it.
  pub fn try_acquire(path: &Path, actor: &User) -> Result<Self, StoreLockError> {
    let io_err = |source| StoreLockError::Io {
      path: path.to_path_buf(),
      source,
    };

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(path)
      .map_err(io_err)?;

    match try_lock_exclusive(&file) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
        return Err(StoreLockError::Held {
          path: path.to_path_buf(),
          holder: read_holder(&file).ok(),
        });
      }
      Err(e) => return Err(io_err(e)),
    }

    let lock = StoreLock {
      file,
      path: path.to_path_buf(),
    };
    lock.record_holder(actor).map_err(io_err)?;
    Ok(lock)
  }

  fn record_holder(&self, actor: &User) -> io::Result<()> {
    let holder = LockHolder {
      pid: std::process::id(),
      user: actor.name.clone(),
      acquired_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    };
    let mut file = &self.file;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    serde_json::to_writer(&mut file, &holder).map_err(io::Error::other)?;
    file.flush()
  }

  pub fn holder(&self) -> io::Result<LockHolder> {
    read_holder(&self.file)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

fn read_holder(mut file: &File) -> io::Result<LockHolder> {
  file.seek(SeekFrom::Start(0))?;
  let mut contents = String::new();
  file.read_to_string(&mut contents)?;
  serde_json::from_str(&contents).map_err(io::Error::other)
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: the handle is valid for the lifetime of `file`, and a zeroed
  // OVERLAPPED selects offset 0.
  let ok = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };
  if ok == 0 {
    let err = io::Error::last_os_error();
    // ERROR_LOCK_VIOLATION
    if err.raw_os_error() == Some(33) {
      return Err(io::Error::from(io::ErrorKind::WouldBlock));
    }
    return Err(err);
  }
  Ok(())
}
