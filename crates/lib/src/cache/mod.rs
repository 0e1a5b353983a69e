//! On-disk artifact cache.
//!
//! Built binaries are stored content-addressed and looked up through one
//! small record per (artifact, version) key.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── .lock                              # advisory lock (gc / commit)
//! ├── holders/<pid>-<n>.json             # who holds .lock right now
//! ├── entries/<artifact>/<version>.json  # key -> object record
//! ├── objects/<sha256>/<filename>        # committed binaries (immutable)
//! └── tmp/                               # staging for in-flight commits
//! ```
//!
//! Both objects and records are written to `tmp/` first and renamed into
//! place, so a reader sees either the previous entry for a key or the new
//! one. The last successful commit for a key wins.

mod entry;
pub mod gc;
pub mod lock;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use entry::{CacheEntry, CacheKey, ENTRY_FORMAT_VERSION, OBJECTS_DIR, escape_version};
pub use gc::{GcResult, GcStats};
use lock::{CacheLock, CacheLockError};

use crate::util::hash::{copy_and_hash, hash_file};

const ENTRIES_DIR: &str = "entries";
const TMP_DIR: &str = "tmp";

/// Errors produced by the artifact cache.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The cache root could not be created or opened.
  #[error("failed to open cache at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid cache key '{key}': {reason}")]
  InvalidKey { key: String, reason: &'static str },

  /// No entry exists for the key.
  #[error("no cached build for {key}")]
  NotFound { key: CacheKey },

  /// An entry exists but cannot be trusted.
  #[error("cached build for {key} is corrupted: {reason}")]
  Corrupted { key: CacheKey, reason: String },

  #[error("missing expected artifact '{0}'")]
  SourceMissing(PathBuf),

  #[error("artifact '{0}' is not a regular file")]
  NotAFile(PathBuf),

  #[error("failed to read '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove '{path}': {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Lock(#[from] CacheLockError),
}

impl CacheError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, CacheError::NotFound { .. })
  }
}

/// Handle to an artifact cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
  root: PathBuf,
}

impl ArtifactCache {
  /// Open the cache at `root`, creating its layout if missing.
  ///
  /// Idempotent: existing entries and objects are left untouched.
  pub fn open_or_create(root: impl AsRef<Path>) -> Result<Self, CacheError> {
    let root = root.as_ref();
    let open_err = |source| CacheError::Open {
      path: root.to_path_buf(),
      source,
    };

    for dir in [ENTRIES_DIR, OBJECTS_DIR, TMP_DIR] {
      fs::create_dir_all(root.join(dir)).map_err(open_err)?;
    }
    let root = dunce::canonicalize(root).map_err(open_err)?;

    debug!(root = %root.display(), "opened artifact cache");
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn tmp_dir(&self) -> PathBuf {
    self.root.join(TMP_DIR)
  }

  fn record_path(&self, key: &CacheKey) -> PathBuf {
    self
      .root
      .join(ENTRIES_DIR)
      .join(&key.artifact)
      .join(key.record_filename())
  }

  /// Path of the cached binary for (`artifact`, `version`).
  ///
  /// The object is re-hashed against its record, so a truncated or modified
  /// binary is reported as [`CacheError::Corrupted`] rather than returned.
  pub fn get(&self, artifact: &str, version: &str) -> Result<PathBuf, CacheError> {
    let key = CacheKey::new(artifact, version)?;
    let entry = self.read_entry(&key)?;
    self.verify(&key, &entry)
  }

  /// The entry record for (`artifact`, `version`), without verifying its object.
  pub fn entry(&self, artifact: &str, version: &str) -> Result<CacheEntry, CacheError> {
    let key = CacheKey::new(artifact, version)?;
    self.read_entry(&key)
  }

  fn read_entry(&self, key: &CacheKey) -> Result<CacheEntry, CacheError> {
    let path = self.record_path(key);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(CacheError::NotFound { key: key.clone() });
      }
      Err(source) => return Err(CacheError::Read { path, source }),
    };

    let entry: CacheEntry = serde_json::from_str(&content).map_err(|e| CacheError::Corrupted {
      key: key.clone(),
      reason: format!("unreadable entry record: {}", e),
    })?;

    if entry.key() != *key {
      return Err(CacheError::Corrupted {
        key: key.clone(),
        reason: format!("entry record belongs to {}", entry.key()),
      });
    }
    Ok(entry)
  }

  fn verify(&self, key: &CacheKey, entry: &CacheEntry) -> Result<PathBuf, CacheError> {
    let corrupted = |reason: String| CacheError::Corrupted {
      key: key.clone(),
      reason,
    };

    let object = entry
      .resolve_object(&self.root)
      .ok_or_else(|| corrupted(format!("invalid object path '{}'", entry.object)))?;

    match fs::metadata(&object) {
      Ok(meta) if meta.is_file() => {}
      Ok(_) => return Err(corrupted(format!("object '{}' is not a file", object.display()))),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(corrupted(format!("object '{}' is missing", object.display())));
      }
      Err(source) => return Err(CacheError::Read { path: object, source }),
    }

    let actual = hash_file(&object).map_err(|source| CacheError::Read {
      path: object.clone(),
      source,
    })?;
    if actual.0 != entry.sha256 {
      warn!(
        key = %key,
        expected = %entry.sha256,
        actual = %actual,
        "cached object checksum mismatch"
      );
      return Err(corrupted("object checksum mismatch".to_string()));
    }

    Ok(object)
  }

  /// Commit the binary at `source` under (`artifact`, `version`).
  ///
  /// Replaces any existing entry for the key. The binary keeps its filename
  /// inside the cache.
  pub fn cache(&self, artifact: &str, version: &str, source: &Path) -> Result<(), CacheError> {
    let key = CacheKey::new(artifact, version)?;

    match fs::metadata(source) {
      Ok(meta) if meta.is_file() => {}
      Ok(_) => return Err(CacheError::NotAFile(source.to_path_buf())),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(CacheError::SourceMissing(source.to_path_buf()));
      }
      Err(source_err) => {
        return Err(CacheError::Read {
          path: source.to_path_buf(),
          source: source_err,
        });
      }
    }
    let filename = source
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .ok_or_else(|| CacheError::NotAFile(source.to_path_buf()))?;

    let _lock = CacheLock::shared(&self.root, "commit")?;

    info!(key = %key, source = %source.display(), "committing build to cache");

    let (object_rel, hash, size) = self.store_object(source, &filename)?;

    let entry = CacheEntry {
      format: ENTRY_FORMAT_VERSION,
      artifact: key.artifact.clone(),
      version: key.version.clone(),
      object: object_rel,
      sha256: hash.0,
      size,
      committed_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    };
    self.write_entry(&key, &entry)?;

    info!(key = %key, object = %entry.object, size, "build cached");
    Ok(())
  }

  /// Stage `source` in `tmp/`, then rename it into `objects/<sha256>/<filename>`.
  fn store_object(
    &self,
    source: &Path,
    filename: &str,
  ) -> Result<(String, crate::util::hash::ContentHash, u64), CacheError> {
    let tmp_dir = self.tmp_dir();
    let write_err = |source| CacheError::Write {
      path: tmp_dir.clone(),
      source,
    };

    let mut staged = tempfile::Builder::new()
      .prefix(".object-")
      .tempfile_in(&tmp_dir)
      .map_err(write_err)?;

    let mut input = fs::File::open(source).map_err(|e| CacheError::Read {
      path: source.to_path_buf(),
      source: e,
    })?;
    let (hash, size) = copy_and_hash(&mut input, staged.as_file_mut()).map_err(write_err)?;
    set_executable(staged.as_file()).map_err(write_err)?;
    staged.as_file().sync_all().map_err(write_err)?;

    let object_rel = CacheEntry::object_path_for(&hash, filename);
    let object_dir = self.root.join(OBJECTS_DIR).join(&hash.0);
    let object_path = object_dir.join(filename);

    fs::create_dir_all(&object_dir).map_err(|source| CacheError::Write {
      path: object_dir.clone(),
      source,
    })?;

    if object_path.is_file() && hash_file(&object_path).is_ok_and(|existing| existing == hash) {
      debug!(object = %object_path.display(), "identical object already cached");
    } else {
      staged.persist(&object_path).map_err(|e| CacheError::Write {
        path: object_path.clone(),
        source: e.error,
      })?;
    }

    Ok((object_rel, hash, size))
  }

  fn write_entry(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
    let path = self.record_path(key);
    let write_err = |source| CacheError::Write {
      path: path.clone(),
      source,
    };

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(write_err)?;
    }

    let content = serde_json::to_string_pretty(entry).map_err(|e| write_err(io::Error::other(e)))?;

    // Write atomically: write to temp file, then rename
    let mut staged = tempfile::Builder::new()
      .prefix(".entry-")
      .tempfile_in(self.tmp_dir())
      .map_err(write_err)?;
    staged.write_all(content.as_bytes()).map_err(write_err)?;
    staged.as_file().sync_all().map_err(write_err)?;
    staged.persist(&path).map_err(|e| write_err(e.error))?;

    Ok(())
  }

  /// All readable entries, sorted by artifact then version.
  pub fn list(&self) -> Result<Vec<CacheEntry>, CacheError> {
    let entries_dir = self.root.join(ENTRIES_DIR);
    let mut entries = Vec::new();

    let artifacts = fs::read_dir(&entries_dir).map_err(|source| CacheError::Read {
      path: entries_dir.clone(),
      source,
    })?;

    for artifact_dir in artifacts.filter_map(|e| e.ok()) {
      if !artifact_dir.file_type().is_ok_and(|t| t.is_dir()) {
        continue;
      }
      let Ok(records) = fs::read_dir(artifact_dir.path()) else {
        warn!(path = %artifact_dir.path().display(), "skipping unreadable artifact directory");
        continue;
      };

      for record in records.filter_map(|e| e.ok()) {
        let path = record.path();
        if path.extension().is_none_or(|ext| ext != "json") {
          continue;
        }
        match fs::read_to_string(&path)
          .map_err(|e| e.to_string())
          .and_then(|c| serde_json::from_str::<CacheEntry>(&c).map_err(|e| e.to_string()))
        {
          Ok(entry) => entries.push(entry),
          Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable cache entry"),
        }
      }
    }

    entries.sort_by(|a, b| (&a.artifact, &a.version).cmp(&(&b.artifact, &b.version)));
    Ok(entries)
  }

  /// Remove the entry for (`artifact`, `version`).
  ///
  /// The object stays on disk until garbage collection. Returns whether an
  /// entry existed.
  pub fn remove(&self, artifact: &str, version: &str) -> Result<bool, CacheError> {
    let key = CacheKey::new(artifact, version)?;
    let path = self.record_path(&key);

    match fs::remove_file(&path) {
      Ok(()) => {
        info!(key = %key, "removed cache entry");
        if let Some(parent) = path.parent() {
          // Only succeeds once the artifact has no entries left.
          let _ = fs::remove_dir(parent);
        }
        Ok(true)
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
      Err(source) => Err(CacheError::Remove { path, source }),
    }
  }
}

#[cfg(unix)]
fn set_executable(file: &fs::File) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  file.set_permissions(fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_file: &fs::File) -> io::Result<()> {
  Ok(())
}
