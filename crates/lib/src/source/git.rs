//! Git-backed source blueprint.
//!
//! Clones with gix into the work dir's GOPATH layout, resolves version
//! references with gix, and moves the worktree with `git checkout` through
//! the configured [`CommandRunner`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Blueprint, SourceError, SourceTree};
use crate::consts::OPENBAZAARD;
use crate::pipeline::{BuildCommand, CommandRunner, SystemRunner};

pub const OPENBAZAAR_GO_URL: &str = "https://github.com/OpenBazaar/openbazaar-go.git";
pub const OPENBAZAAR_GO_IMPORT_PATH: &str = "github.com/OpenBazaar/openbazaar-go";

/// Blueprint for a Go project hosted in a git repository.
#[derive(Debug, Clone)]
pub struct GitBlueprint<R = SystemRunner> {
  url: String,
  import_path: String,
  binary_prefix: String,
  runner: R,
}

impl GitBlueprint<SystemRunner> {
  /// The OpenBazaar daemon (`openbazaar-go`).
  pub fn openbazaar_daemon() -> Self {
    Self::new(OPENBAZAAR_GO_URL, OPENBAZAAR_GO_IMPORT_PATH, OPENBAZAARD, SystemRunner)
  }
}

impl<R: CommandRunner + Clone> GitBlueprint<R> {
  pub fn new(url: impl Into<String>, import_path: impl Into<String>, binary_prefix: impl Into<String>, runner: R) -> Self {
    Self {
      url: url.into(),
      import_path: import_path.into(),
      binary_prefix: binary_prefix.into(),
      runner,
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn binary_prefix(&self) -> &str {
    &self.binary_prefix
  }
}

impl<R: CommandRunner + Clone> Blueprint for GitBlueprint<R> {
  type Source = GitSource<R>;

  async fn inflate(&self, work_dir: &Path) -> Result<GitSource<R>, SourceError> {
    let source = GitSource {
      work_dir: work_dir.to_path_buf(),
      import_path: self.import_path.clone(),
      binary_prefix: self.binary_prefix.clone(),
      runner: self.runner.clone(),
    };
    let repo_dir = source.package_dir();

    if let Some(parent) = repo_dir.parent() {
      fs::create_dir_all(parent).map_err(|e| SourceError::CreateDir(parent.to_path_buf(), e))?;
    }

    info!(url = %self.url, path = %repo_dir.display(), "cloning repository");
    let url = self.url.clone();
    tokio::task::spawn_blocking(move || clone_repo(&url, &repo_dir)).await??;

    Ok(source)
  }
}

/// A cloned repository inside a work dir.
#[derive(Debug, Clone)]
pub struct GitSource<R = SystemRunner> {
  work_dir: PathBuf,
  import_path: String,
  binary_prefix: String,
  runner: R,
}

impl<R: CommandRunner + Clone> SourceTree for GitSource<R> {
  fn work_dir(&self) -> &Path {
    &self.work_dir
  }

  fn binary_prefix(&self) -> &str {
    &self.binary_prefix
  }

  fn import_path(&self) -> &str {
    &self.import_path
  }

  async fn checkout_version(&self, version: &str) -> Result<(), SourceError> {
    let repo_dir = self.package_dir();

    let commit = {
      let repo_dir = repo_dir.clone();
      let version = version.to_string();
      tokio::task::spawn_blocking(move || resolve_revision(&repo_dir, &version)).await??
    };
    debug!(rev = %version, commit = %commit, "resolved revision");

    let checkout = BuildCommand::new("git").args(["checkout", "--quiet", "--detach", commit.as_str()]);
    let output = self
      .runner
      .run(&checkout, &repo_dir)
      .await
      .map_err(|e| SourceError::Checkout {
        rev: version.to_string(),
        message: e.to_string(),
      })?;

    if !output.success() {
      return Err(SourceError::Checkout {
        rev: version.to_string(),
        message: format!("`{}` exited with {:?}: {}", checkout, output.code, output.stderr.trim()),
      });
    }

    info!(rev = %version, commit = %commit, "checked out version");
    Ok(())
  }
}

/// Clone a git repository to the specified path.
fn clone_repo(url: &str, dest: &Path) -> Result<(), SourceError> {
  let clone_err = |e: Box<dyn std::error::Error + Send + Sync>| SourceError::Clone {
    url: url.to_string(),
    source: e,
  };

  let mut prepared = gix::prepare_clone(url, dest).map_err(|e| clone_err(Box::new(e)))?;

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;

  checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;

  Ok(())
}

/// Spellings tried, in order, when resolving a version reference.
///
/// Remote branches only exist as `origin/<name>` after a fresh clone.
fn revision_candidates(rev: &str) -> Vec<String> {
  vec![format!("{}^{{commit}}", rev), format!("origin/{}^{{commit}}", rev)]
}

/// Resolve a tag, branch or commit to the full commit hash it names.
fn resolve_revision(repo_dir: &Path, rev: &str) -> Result<String, SourceError> {
  let repo = gix::open(repo_dir).map_err(|e| SourceError::Open {
    path: repo_dir.to_path_buf(),
    source: Box::new(e),
  })?;

  for candidate in revision_candidates(rev) {
    let Ok(spec) = repo.rev_parse(candidate.as_str()) else {
      continue;
    };
    if let Some(id) = spec.single() {
      return Ok(id.to_string());
    }
  }

  Err(SourceError::RevisionNotFound { rev: rev.to_string() })
}
