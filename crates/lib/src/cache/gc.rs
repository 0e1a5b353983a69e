//! Garbage collection of unreferenced cache objects.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::lock::CacheLock;
use super::{ArtifactCache, CacheError, OBJECTS_DIR, TMP_DIR};

#[derive(Debug, Default, Serialize)]
pub struct GcStats {
  pub objects_scanned: usize,
  pub objects_deleted: usize,
  pub staging_deleted: usize,
  pub bytes_freed: u64,
}

impl GcStats {
  pub fn total_deleted(&self) -> usize {
    self.objects_deleted + self.staging_deleted
  }
}

#[derive(Debug, Serialize)]
pub struct GcResult {
  pub stats: GcStats,
  pub deleted_paths: Vec<PathBuf>,
  pub dry_run: bool,
}

impl ArtifactCache {
  /// Delete objects no entry references and leftovers of interrupted commits.
  ///
  /// Holds the cache lock exclusively. Fails with [`CacheLockError::Busy`]
  /// while a commit or another gc holds it.
  ///
  /// [`CacheLockError::Busy`]: super::lock::CacheLockError::Busy
  pub fn collect_garbage(&self, dry_run: bool) -> Result<GcResult, CacheError> {
    let _lock = CacheLock::try_exclusive(self.root(), "gc")?;

    let live: HashSet<PathBuf> = self
      .list()?
      .iter()
      .filter_map(|entry| entry.resolve_object(self.root()))
      .collect();
    debug!(count = live.len(), "collected live objects");

    let mut stats = GcStats::default();
    let mut deleted_paths = Vec::new();

    let objects_dir = self.root().join(OBJECTS_DIR);
    for entry in WalkDir::new(&objects_dir)
      .min_depth(2)
      .max_depth(2)
      .into_iter()
      .filter_map(|e| e.ok())
    {
      stats.objects_scanned += 1;
      let path = entry.path();
      if live.contains(path) {
        continue;
      }

      let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
      if !dry_run {
        delete_path(path, entry.file_type().is_dir())?;
        if let Some(parent) = path.parent() {
          // Leaves hash directories that still hold a live object.
          let _ = fs::remove_dir(parent);
        }
      }
      debug!(path = %path.display(), size, dry_run, "unreferenced object");
      stats.objects_deleted += 1;
      stats.bytes_freed += size;
      deleted_paths.push(path.to_path_buf());
    }

    let tmp_dir = self.root().join(TMP_DIR);
    let staged = fs::read_dir(&tmp_dir).map_err(|source| CacheError::Read {
      path: tmp_dir.clone(),
      source,
    })?;
    for entry in staged.filter_map(|e| e.ok()) {
      let path = entry.path();
      let meta = match entry.metadata() {
        Ok(meta) => meta,
        Err(e) => {
          warn!(path = %path.display(), error = %e, "skipping unreadable staging entry");
          continue;
        }
      };
      if !dry_run {
        delete_path(&path, meta.is_dir())?;
      }
      stats.staging_deleted += 1;
      stats.bytes_freed += meta.len();
      deleted_paths.push(path);
    }

    info!(
      objects_deleted = stats.objects_deleted,
      staging_deleted = stats.staging_deleted,
      bytes_freed = stats.bytes_freed,
      dry_run,
      "garbage collection complete"
    );

    Ok(GcResult {
      stats,
      deleted_paths,
      dry_run,
    })
  }
}

fn delete_path(path: &Path, is_dir: bool) -> Result<(), CacheError> {
  let result = if is_dir {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  };
  result.map_err(|source| CacheError::Remove {
    path: path.to_path_buf(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::lock::CacheLockError;
  use tempfile::TempDir;

  fn setup() -> (TempDir, ArtifactCache) {
    let temp = TempDir::new().unwrap();
    let cache = ArtifactCache::open_or_create(temp.path().join("cache")).unwrap();
    (temp, cache)
  }

  #[test]
  fn keeps_referenced_objects() {
    let (temp, cache) = setup();
    let bin = temp.path().join("bin");
    fs::write(&bin, "live").unwrap();
    cache.cache("openbazaard", "v1", &bin).unwrap();

    let result = cache.collect_garbage(false).unwrap();

    assert_eq!(result.stats.objects_scanned, 1);
    assert_eq!(result.stats.total_deleted(), 0);
    assert!(cache.get("openbazaard", "v1").is_ok());
  }

  #[test]
  fn removes_objects_of_removed_entries() {
    let (temp, cache) = setup();
    let bin = temp.path().join("bin");
    fs::write(&bin, "dead").unwrap();
    cache.cache("openbazaard", "v1", &bin).unwrap();
    let object = cache.get("openbazaard", "v1").unwrap();
    cache.remove("openbazaard", "v1").unwrap();

    let result = cache.collect_garbage(false).unwrap();

    assert_eq!(result.stats.objects_deleted, 1);
    assert_eq!(result.stats.bytes_freed, 4);
    assert!(!object.exists());
    assert!(!object.parent().unwrap().exists());
  }

  #[test]
  fn removes_staging_leftovers() {
    let (_temp, cache) = setup();
    fs::write(cache.root().join(TMP_DIR).join(".object-abc"), "partial").unwrap();

    let result = cache.collect_garbage(false).unwrap();

    assert_eq!(result.stats.staging_deleted, 1);
    assert_eq!(fs::read_dir(cache.root().join(TMP_DIR)).unwrap().count(), 0);
  }

  #[test]
  fn dry_run_deletes_nothing() {
    let (temp, cache) = setup();
    let bin = temp.path().join("bin");
    fs::write(&bin, "dead").unwrap();
    cache.cache("openbazaard", "v1", &bin).unwrap();
    let object = cache.get("openbazaard", "v1").unwrap();
    cache.remove("openbazaard", "v1").unwrap();

    let result = cache.collect_garbage(true).unwrap();

    assert!(result.dry_run);
    assert_eq!(result.deleted_paths, vec![object.clone()]);
    assert!(object.exists());
  }

  #[test]
  #[cfg(unix)]
  fn refused_while_commit_holds_the_cache() {
    let (_temp, cache) = setup();
    let _commit = CacheLock::shared(cache.root(), "commit").unwrap();

    let err = cache.collect_garbage(false).unwrap_err();

    match err {
      CacheError::Lock(CacheLockError::Busy { holders, .. }) => assert_eq!(holders[0].purpose, "commit"),
      other => panic!("expected Busy, got {}", other),
    }
  }
}
