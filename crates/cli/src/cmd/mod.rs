mod build;
mod gc;
mod info;
mod list;
mod remove;
mod run;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use mason_lib::builder::{Builder, BuilderConfig};
use mason_lib::source::GitBlueprint;

pub use build::cmd_build;
pub use gc::cmd_gc;
pub use info::cmd_info;
pub use list::cmd_list;
pub use remove::cmd_remove;
pub use run::cmd_run;

/// Exit status used when the work dir cannot be removed.
const CLEANUP_FAILURE_EXIT: i32 = 2;

/// Flags shared by `build` and `run`.
pub struct BuildOptions {
  pub version: String,
  pub label: Option<String>,
  pub go_version: Option<String>,
  pub command_timeout: Option<Duration>,
  pub keep_workdir: bool,
}

impl BuildOptions {
  fn builder(&self, cache_root: &Path) -> Result<Builder<GitBlueprint>> {
    let mut config = BuilderConfig::openbazaard(&self.version)
      .context("Invalid configuration")?
      .with_cache_root(cache_root);
    if let Some(label) = &self.label {
      config = config.with_label(label);
    }
    if let Some(go_version) = &self.go_version {
      config.toolchain.go_version = go_version.clone();
    }
    if self.command_timeout.is_some() {
      config.toolchain.command_timeout = self.command_timeout;
    }
    Ok(Builder::openbazaard(config))
  }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}

/// Remove the builder's work dir unless asked to keep it.
///
/// A work dir that cannot be removed terminates the process.
async fn finish(builder: &Builder<GitBlueprint>, keep_workdir: bool) {
  if keep_workdir {
    if let Some(dir) = builder.work_dir().await {
      info!(work_dir = %dir.display(), "keeping work dir");
    }
    return;
  }

  if let Err(e) = builder.must_clean().await {
    crate::output::status(crate::output::Status::Failed, &format!("{:#}", anyhow::Error::new(e)));
    std::process::exit(CLEANUP_FAILURE_EXIT);
  }
}
