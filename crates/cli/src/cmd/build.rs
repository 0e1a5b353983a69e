//! Implementation of the `mason build` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::output::{OutputFormat, Status, elapsed, field, print_json, status};

use super::{BuildOptions, finish, runtime};

#[derive(Serialize)]
struct BuildReport {
  artifact: String,
  version: String,
  path: String,
  cached: bool,
  duration_ms: u128,
}

/// Build the requested version, or reuse the cached build, and print where
/// the binary lives.
pub fn cmd_build(cache_root: &Path, options: BuildOptions, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let builder = options.builder(cache_root)?;

  let rt = runtime()?;
  let (result, cached) = rt.block_on(async {
    let result = builder.build().await;
    let cached = builder.work_dir().await.is_none();
    finish(&builder, options.keep_workdir).await;
    (result, cached)
  });
  let runner = result.context("Build failed")?;

  let config = builder.config();
  let report = BuildReport {
    artifact: config.artifact.clone(),
    version: config.version.clone(),
    path: runner.path().display().to_string(),
    cached,
    duration_ms: start.elapsed().as_millis(),
  };

  if output.is_json() {
    print_json(&report)?;
  } else {
    if cached {
      status(Status::Done, &format!("Using cached {} {}", report.artifact, report.version));
    } else {
      status(Status::Done, &format!("Built {} {}", report.artifact, report.version));
    }
    field("Binary", &report.path);
    field("Duration", elapsed(start.elapsed()));
  }

  Ok(())
}
