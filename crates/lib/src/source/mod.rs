//! Source blueprints.
//!
//! A [`Blueprint`] knows where an upstream project lives and how to lay its
//! source out in a work dir; the [`SourceTree`] it inflates can then be moved
//! to a specific version before the pipeline builds it.

mod git;

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use git::{GitBlueprint, GitSource, OPENBAZAAR_GO_IMPORT_PATH, OPENBAZAAR_GO_URL};

/// Errors from fetching or checking out source.
#[derive(Debug, Error)]
pub enum SourceError {
  #[error("failed to create source directory '{0}': {1}")]
  CreateDir(PathBuf, #[source] std::io::Error),

  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  #[error("revision '{rev}' not found in repository")]
  RevisionNotFound { rev: String },

  #[error("failed to checkout revision '{rev}': {message}")]
  Checkout { rev: String, message: String },

  #[error("source task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

/// A source tree inflated into a work dir.
pub trait SourceTree: Send + Sync {
  /// Root of the work dir the source was inflated into (also the GOPATH).
  fn work_dir(&self) -> &Path;

  /// Prefix of the binary the toolchain produces (`-out`).
  fn binary_prefix(&self) -> &str;

  /// Go import path of the main package, e.g. `github.com/OpenBazaar/openbazaar-go`.
  fn import_path(&self) -> &str;

  /// Directory holding the package source: `<work_dir>/src/<import_path>`.
  fn package_dir(&self) -> PathBuf {
    self
      .import_path()
      .split('/')
      .fold(self.work_dir().join("src"), |dir, part| dir.join(part))
  }

  /// Move the tree to `version` (tag, branch or commit).
  fn checkout_version(&self, version: &str) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// Fetches a project's source into a work dir.
pub trait Blueprint: Send + Sync {
  type Source: SourceTree;

  fn inflate(&self, work_dir: &Path) -> impl Future<Output = Result<Self::Source, SourceError>> + Send;
}
