//! Implementation of the `mason run` command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{BuildOptions, finish, runtime};

/// Build-or-reuse the requested version, then run it with `args`.
///
/// Exits with the binary's exit code.
pub fn cmd_run(cache_root: &Path, options: BuildOptions, args: &[String]) -> Result<()> {
  let builder = options.builder(cache_root)?;

  let rt = runtime()?;
  let status = rt.block_on(async {
    let result = builder.build().await;
    finish(&builder, options.keep_workdir).await;
    let runner = result.context("Build failed")?;

    info!(path = %runner.path().display(), "starting binary");
    runner.run(args).await.context("Failed to run binary")
  })?;

  std::process::exit(status.code().unwrap_or(1));
}
