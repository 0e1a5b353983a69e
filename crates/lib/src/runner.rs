//! Executable wrapper for a built binary.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("binary not found: {0}")]
  NotFound(PathBuf),

  #[error("not a regular file: {0}")]
  NotAFile(PathBuf),

  #[error("binary is not executable: {0}")]
  NotExecutable(PathBuf),

  #[error("failed to inspect binary '{path}': {source}")]
  Metadata {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to run '{path}': {source}")]
  Spawn {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A binary on disk that is ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runner {
  path: PathBuf,
}

impl Runner {
  /// Wrap `path`, checking it is an existing executable file.
  pub fn from_binary_path(path: impl Into<PathBuf>) -> Result<Self, RunnerError> {
    let path = path.into();
    let metadata = match fs::metadata(&path) {
      Ok(m) => m,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(RunnerError::NotFound(path)),
      Err(source) => return Err(RunnerError::Metadata { path, source }),
    };

    if !metadata.is_file() {
      return Err(RunnerError::NotAFile(path));
    }
    if !is_executable(&metadata) {
      return Err(RunnerError::NotExecutable(path));
    }

    Ok(Self { path })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// A command for the binary, for callers that need to configure stdio or env.
  pub fn command(&self) -> Command {
    Command::new(&self.path)
  }

  /// Run the binary with `args`, inheriting stdio, and wait for it to exit.
  pub async fn run<I, S>(&self, args: I) -> Result<ExitStatus, RunnerError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    debug!(path = %self.path.display(), "running binary");
    self
      .command()
      .args(args)
      .status()
      .await
      .map_err(|source| RunnerError::Spawn {
        path: self.path.clone(),
        source,
      })
  }
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
  use std::os::unix::fs::PermissionsExt;
  metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
  true
}
