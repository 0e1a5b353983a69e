//! Build-or-reuse orchestration.
//!
//! A [`Builder`] answers "give me a runnable binary for this version": it
//! returns the cached binary when there is one and otherwise inflates the
//! source into a fresh work dir, cross-compiles it, and commits the result
//! to the cache before handing out the cached copy.
//!
//! Builds are serialized per builder. The initial cache lookup is not, so two
//! builders racing on the same key may both build; the cache's atomic commit
//! keeps that correct (the last commit wins and both binaries are
//! interchangeable).

mod types;

use std::io;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};

pub use types::{BuildError, BuilderConfig, COMMAND_TIMEOUT_ENV, CleanupError, ConfigError, command_timeout_from_env};

use crate::cache::{ArtifactCache, CacheError};
use crate::consts::DEST_DIR_NAME;
use crate::pipeline::{CommandRunner, Pipeline, SystemRunner};
use crate::platform::BuildTarget;
use crate::platform::paths::temp_build_dir;
use crate::runner::Runner;
use crate::source::{Blueprint, GitBlueprint, SourceTree};

/// Produces a runnable binary for one (artifact, version), building it only
/// when the cache has no usable copy.
pub struct Builder<B, R = SystemRunner> {
  config: BuilderConfig,
  blueprint: B,
  runner: R,
  target: Option<BuildTarget>,
  /// Work dirs of every build attempt not yet cleaned, oldest first. The
  /// mutex also serializes builds.
  work_dirs: Mutex<Vec<PathBuf>>,
}

impl Builder<GitBlueprint, SystemRunner> {
  /// A builder for the OpenBazaar daemon using the host toolchain.
  pub fn openbazaard(config: BuilderConfig) -> Self {
    Self::new(config, GitBlueprint::openbazaar_daemon(), SystemRunner)
  }
}

impl<B: Blueprint, R: CommandRunner> Builder<B, R> {
  pub fn new(config: BuilderConfig, blueprint: B, runner: R) -> Self {
    Self {
      config,
      blueprint,
      runner,
      target: BuildTarget::current(),
      work_dirs: Mutex::new(Vec::new()),
    }
  }

  /// Build for `target` instead of the host platform.
  pub fn with_target(mut self, target: BuildTarget) -> Self {
    self.target = Some(target);
    self
  }

  pub fn config(&self) -> &BuilderConfig {
    &self.config
  }

  /// Work dir of the latest build attempt, if one was allocated.
  pub async fn work_dir(&self) -> Option<PathBuf> {
    self.work_dirs.lock().await.last().cloned()
  }

  /// Return a runner for the configured version, building it if needed.
  pub async fn build(&self) -> Result<Runner, BuildError> {
    let span = info_span!("builder", label = %self.config.label, version = %self.config.version);
    self.build_inner().instrument(span).await
  }

  async fn build_inner(&self) -> Result<Runner, BuildError> {
    let cache = match ArtifactCache::open_or_create(&self.config.cache_root) {
      Ok(cache) => Some(cache),
      Err(e) => {
        warn!(error = %e, "artifact cache unavailable, building without it");
        None
      }
    };

    if let Some(path) = cache.as_ref().and_then(|c| self.lookup(c)) {
      info!(path = %path.display(), "using cached build");
      return Ok(Runner::from_binary_path(path)?);
    }

    let mut work_dirs = self.work_dirs.lock().await;

    // Another build on this builder may have committed while we waited.
    if let Some(path) = cache.as_ref().and_then(|c| self.lookup(c)) {
      info!(path = %path.display(), "using build committed while waiting");
      return Ok(Runner::from_binary_path(path)?);
    }

    let target = self.target.ok_or(BuildError::UnsupportedPlatform {
      os: std::env::consts::OS,
      arch: std::env::consts::ARCH,
    })?;

    let dir = prepare_work_dir(&self.config.label).map_err(BuildError::Prepare)?;
    work_dirs.push(dir.clone());
    info!(work_dir = %dir.display(), build_target = %target, "building");

    let source = self
      .blueprint
      .inflate(&dir)
      .await
      .map_err(BuildError::InflateSource)?;
    source
      .checkout_version(&self.config.version)
      .await
      .map_err(BuildError::Checkout)?;

    let pipeline = Pipeline::xgo(&source, &target, &self.config.toolchain);
    let output = pipeline
      .run(&self.runner, &dir)
      .await
      .map_err(|source| BuildError::CrossBuild {
        os: target.os.to_string(),
        source,
      })?;
    if !output.is_file() {
      return Err(BuildError::ArtifactMissing(output));
    }

    let cache = match cache {
      Some(cache) => cache,
      None => ArtifactCache::open_or_create(&self.config.cache_root).map_err(BuildError::CacheCommit)?,
    };
    cache
      .cache(&self.config.artifact, &self.config.version, &output)
      .map_err(BuildError::CacheCommit)?;

    let path = cache
      .get(&self.config.artifact, &self.config.version)
      .map_err(BuildError::CacheRetrieve)?;
    drop(work_dirs);

    info!(path = %path.display(), "build cached");
    Ok(Runner::from_binary_path(path)?)
  }

  /// Cached binary for the configured key, if it is usable.
  fn lookup(&self, cache: &ArtifactCache) -> Option<PathBuf> {
    match cache.get(&self.config.artifact, &self.config.version) {
      Ok(path) => Some(path),
      Err(CacheError::NotFound { .. }) => {
        debug!("no cached build");
        None
      }
      Err(e @ CacheError::Corrupted { .. }) => {
        warn!(error = %e, "cached build is corrupted, rebuilding");
        None
      }
      Err(e) => {
        warn!(error = %e, "cache lookup failed, rebuilding");
        None
      }
    }
  }

  /// Remove the work dirs of every build attempt on this builder.
  ///
  /// Waits for an in-flight build. A no-op when no work dir was allocated,
  /// e.g. after a cache hit. Stops at the first dir that cannot be removed;
  /// it and any later dirs stay recorded so a retry picks them up.
  pub async fn must_clean(&self) -> Result<(), CleanupError> {
    let mut work_dirs = self.work_dirs.lock().await;
    if work_dirs.is_empty() {
      debug!("no work dir to clean");
      return Ok(());
    }

    while let Some(path) = work_dirs.first().cloned() {
      match tokio::fs::remove_dir_all(&path).await {
        Ok(()) => info!(work_dir = %path.display(), "removed work dir"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(CleanupError { path, source }),
      }
      work_dirs.remove(0);
    }
    Ok(())
  }
}

fn prepare_work_dir(label: &str) -> io::Result<PathBuf> {
  let dir = temp_build_dir(label)?;
  std::fs::create_dir_all(dir.join(DEST_DIR_NAME))?;
  Ok(dir)
}
