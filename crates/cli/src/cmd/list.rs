use std::path::Path;

use anyhow::{Context, Result};

use mason_lib::cache::ArtifactCache;

use crate::output::{OutputFormat, Status, entry_header, entry_row, print_json, status};

pub fn cmd_list(cache_root: &Path, output: OutputFormat) -> Result<()> {
  let cache = ArtifactCache::open_or_create(cache_root).context("Failed to open artifact cache")?;
  let entries = cache.list().context("Failed to list cache entries")?;

  if output.is_json() {
    return print_json(&entries);
  }

  if entries.is_empty() {
    status(Status::Note, "No cached builds");
    return Ok(());
  }

  println!("{}", entry_header());
  for entry in &entries {
    println!("{}", entry_row(entry));
  }

  Ok(())
}
