use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use mason_lib::cache::ArtifactCache;

use crate::output::{OutputFormat, Status, elapsed, field, print_json, size, status};

pub fn cmd_gc(cache_root: &Path, dry_run: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();

  let cache = ArtifactCache::open_or_create(cache_root).context("Failed to open artifact cache")?;
  let result = cache.collect_garbage(dry_run).context("Garbage collection failed")?;

  if output.is_json() {
    print_json(&result)?;
  } else {
    println!();
    if dry_run {
      status(Status::Note, "Dry run - no changes made");
    } else {
      status(Status::Done, "Garbage collection complete!");
    }
    field("Objects scanned", result.stats.objects_scanned);
    field("Objects removed", result.stats.objects_deleted);
    field("Staging files removed", result.stats.staging_deleted);
    field("Space freed", size(result.stats.bytes_freed));
    field("Duration", elapsed(start.elapsed()));
  }

  Ok(())
}
