use std::path::Path;

use anyhow::{Context, Result};

use mason_lib::cache::ArtifactCache;

use crate::output::{Status, status};

pub fn cmd_remove(cache_root: &Path, artifact: &str, version: &str) -> Result<()> {
  let cache = ArtifactCache::open_or_create(cache_root).context("Failed to open artifact cache")?;

  if cache.remove(artifact, version).context("Failed to remove cache entry")? {
    status(Status::Done, &format!("Removed {} {}", artifact, version));
    status(Status::Note, "Run `mason gc` to free its disk space");
  } else {
    status(Status::Note, &format!("No cached build for {} {}", artifact, version));
  }

  Ok(())
}
