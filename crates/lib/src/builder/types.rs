//! Builder configuration and error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheError;
use crate::consts::OPENBAZAARD;
use crate::pipeline::{PipelineError, ToolchainConfig};
use crate::platform::paths::cache_dir;
use crate::runner::RunnerError;
use crate::source::SourceError;

/// Environment variable setting the default per-command timeout
/// (humantime syntax, e.g. `15m`).
pub const COMMAND_TIMEOUT_ENV: &str = "MASON_COMMAND_TIMEOUT";

/// Everything a [`Builder`](super::Builder) needs to know up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
  /// Root of the artifact cache.
  pub cache_root: PathBuf,
  /// Human-readable name used in work dir names and logs.
  pub label: String,
  /// Cache artifact name.
  pub artifact: String,
  /// Version reference to check out (tag, branch or commit).
  pub version: String,
  pub toolchain: ToolchainConfig,
}

impl BuilderConfig {
  /// Configuration for the OpenBazaar daemon at `version`, with the cache
  /// root and command timeout taken from the environment.
  pub fn openbazaard(version: impl Into<String>) -> Result<Self, ConfigError> {
    Ok(Self {
      cache_root: cache_dir(),
      label: OPENBAZAARD.to_string(),
      artifact: OPENBAZAARD.to_string(),
      version: version.into(),
      toolchain: ToolchainConfig {
        command_timeout: command_timeout_from_env()?,
        ..Default::default()
      },
    })
  }

  pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
    self.cache_root = cache_root.into();
    self
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = label.into();
    self
  }
}

/// Reads `MASON_COMMAND_TIMEOUT`; unset or empty means no timeout.
pub fn command_timeout_from_env() -> Result<Option<Duration>, ConfigError> {
  match std::env::var(COMMAND_TIMEOUT_ENV) {
    Ok(value) if !value.trim().is_empty() => humantime::parse_duration(value.trim())
      .map(Some)
      .map_err(|source| ConfigError::InvalidTimeout { value, source }),
    _ => Ok(None),
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid {COMMAND_TIMEOUT_ENV} value '{value}': {source}")]
  InvalidTimeout {
    value: String,
    #[source]
    source: humantime::DurationError,
  },
}

/// Errors from [`Builder::build`](super::Builder::build), one per stage.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("unsupported host platform: {os}/{arch}")]
  UnsupportedPlatform { os: &'static str, arch: &'static str },

  #[error("preparing work dir: {0}")]
  Prepare(#[source] std::io::Error),

  #[error("inflating source: {0}")]
  InflateSource(#[source] SourceError),

  #[error("checkout version: {0}")]
  Checkout(#[source] SourceError),

  #[error("building for {os}: {source}")]
  CrossBuild {
    os: String,
    #[source]
    source: PipelineError,
  },

  #[error("build reported success but produced no artifact at '{0}'")]
  ArtifactMissing(PathBuf),

  #[error("caching build: {0}")]
  CacheCommit(#[source] CacheError),

  #[error("retrieving cached build: {0}")]
  CacheRetrieve(#[source] CacheError),

  #[error("wrapping cached build: {0}")]
  Runner(#[from] RunnerError),
}

/// The work dir could not be removed.
///
/// Callers are expected to treat this as fatal.
#[derive(Debug, Error)]
#[error("removing work dir '{path}': {source}")]
pub struct CleanupError {
  pub path: PathBuf,
  #[source]
  pub source: std::io::Error,
}
