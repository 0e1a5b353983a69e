//! Advisory locking of the cache root.
//!
//! Commits hold `<root>/.lock` shared while they move an object into place and
//! write its entry record; garbage collection holds it exclusively so it never
//! sweeps an object a commit is about to reference. A commit waits for a
//! running gc. A gc never waits: it reports who holds the cache instead.
//!
//! Every holder leaves a record under `<root>/holders/` for as long as it
//! holds the lock. Records outlive a crashed holder, so the first exclusive
//! holder after a crash sweeps them.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const LOCK_FILENAME: &str = ".lock";
const HOLDERS_DIR: &str = "holders";

static NEXT_RECORD: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
  Shared,
  Exclusive,
}

/// Who holds the cache lock, as recorded by the holder itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
  pub pid: u32,
  pub mode: LockMode,
  pub purpose: String,
  pub acquired_at_unix: u64,
}

impl fmt::Display for Holder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (PID {}, since Unix timestamp {})", self.purpose, self.pid, self.acquired_at_unix)
  }
}

#[derive(Debug, Error)]
pub enum CacheLockError {
  #[error("cache '{}' is in use by {}", .root.display(), describe(.holders))]
  Busy { root: PathBuf, holders: Vec<Holder> },

  #[error("opening lock file '{}': {source}", .path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("locking '{}': {source}", .path.display())]
  Lock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn describe(holders: &[Holder]) -> String {
  if holders.is_empty() {
    return "another process".to_string();
  }
  holders.iter().map(Holder::to_string).collect::<Vec<_>>().join(", ")
}

/// A held lock on a cache root. Released, and its holder record removed, on
/// drop.
#[derive(Debug)]
pub struct CacheLock {
  _file: File,
  record: Option<PathBuf>,
}

impl CacheLock {
  /// Take the lock shared, waiting for an exclusive holder to finish.
  pub fn shared(root: &Path, purpose: &str) -> Result<Self, CacheLockError> {
    let (file, lock_path) = open_lock_file(root)?;
    lock(&file, LockMode::Shared, true).map_err(|source| CacheLockError::Lock { path: lock_path, source })?;
    Ok(Self::held(root, file, LockMode::Shared, purpose))
  }

  /// Take the lock exclusively, or fail with [`CacheLockError::Busy`] naming
  /// the current holders.
  pub fn try_exclusive(root: &Path, purpose: &str) -> Result<Self, CacheLockError> {
    let (file, lock_path) = open_lock_file(root)?;
    match lock(&file, LockMode::Exclusive, false) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
        return Err(CacheLockError::Busy {
          root: root.to_path_buf(),
          holders: read_holders(root),
        });
      }
      Err(source) => return Err(CacheLockError::Lock { path: lock_path, source }),
    }

    // Nobody else holds the lock, so every record left behind is stale.
    sweep_records(root);
    Ok(Self::held(root, file, LockMode::Exclusive, purpose))
  }

  fn held(root: &Path, file: File, mode: LockMode, purpose: &str) -> Self {
    let holder = Holder {
      pid: std::process::id(),
      mode,
      purpose: purpose.to_string(),
      acquired_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    };
    // The record is informational; holding the lock does not depend on it.
    let record = match write_record(root, &holder) {
      Ok(path) => Some(path),
      Err(e) => {
        warn!(error = %e, "failed to record cache lock holder");
        None
      }
    };
    CacheLock { _file: file, record }
  }
}

impl Drop for CacheLock {
  fn drop(&mut self) {
    if let Some(record) = &self.record
      && let Err(e) = fs::remove_file(record)
      && e.kind() != io::ErrorKind::NotFound
    {
      debug!(path = %record.display(), error = %e, "failed to remove lock holder record");
    }
  }
}

fn open_lock_file(root: &Path) -> Result<(File, PathBuf), CacheLockError> {
  let path = root.join(LOCK_FILENAME);
  let file = OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(&path)
    .map_err(|source| CacheLockError::Open {
      path: path.clone(),
      source,
    })?;
  Ok((file, path))
}

fn write_record(root: &Path, holder: &Holder) -> io::Result<PathBuf> {
  let dir = root.join(HOLDERS_DIR);
  fs::create_dir_all(&dir)?;
  let seq = NEXT_RECORD.fetch_add(1, Ordering::Relaxed);
  let path = dir.join(format!("{}-{}.json", holder.pid, seq));
  fs::write(&path, serde_json::to_vec(holder).map_err(io::Error::other)?)?;
  Ok(path)
}

/// Holder records that can still be read, oldest first.
fn read_holders(root: &Path) -> Vec<Holder> {
  let Ok(entries) = fs::read_dir(root.join(HOLDERS_DIR)) else {
    return Vec::new();
  };
  let mut holders: Vec<Holder> = entries
    .filter_map(Result::ok)
    .filter_map(|entry| fs::read(entry.path()).ok())
    .filter_map(|bytes| serde_json::from_slice(&bytes).ok())
    .collect();
  holders.sort_by_key(|h| h.acquired_at_unix);
  holders
}

fn sweep_records(root: &Path) {
  let Ok(entries) = fs::read_dir(root.join(HOLDERS_DIR)) else {
    return;
  };
  for entry in entries.filter_map(Result::ok) {
    let path = entry.path();
    match fs::remove_file(&path) {
      Ok(()) => debug!(path = %path.display(), "removed stale lock holder record"),
      Err(e) => debug!(path = %path.display(), error = %e, "failed to remove stale lock holder record"),
    }
  }
}

#[cfg(unix)]
fn lock(file: &File, mode: LockMode, wait: bool) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use rustix::io::Errno;
  use std::os::unix::io::AsFd;

  let operation = match (mode, wait) {
    (LockMode::Shared, true) => FlockOperation::LockShared,
    (LockMode::Shared, false) => FlockOperation::NonBlockingLockShared,
    (LockMode::Exclusive, true) => FlockOperation::LockExclusive,
    (LockMode::Exclusive, false) => FlockOperation::NonBlockingLockExclusive,
  };

  loop {
    match flock(file.as_fd(), operation) {
      Ok(()) => return Ok(()),
      Err(Errno::INTR) => continue,
      Err(e) => return Err(io::Error::from_raw_os_error(e.raw_os_error())),
    }
  }
}

#[cfg(windows)]
fn lock(file: &File, mode: LockMode, wait: bool) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let mut flags = 0;
  if mode == LockMode::Exclusive {
    flags |= LOCKFILE_EXCLUSIVE_LOCK;
  }
  if !wait {
    flags |= LOCKFILE_FAIL_IMMEDIATELY;
  }

  // SAFETY: OVERLAPPED is valid zero-initialized and `handle` outlives the call.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result != 0 {
    return Ok(());
  }
  let err = io::Error::last_os_error();
  if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
    return Err(io::Error::from(io::ErrorKind::WouldBlock));
  }
  Err(err)
}
