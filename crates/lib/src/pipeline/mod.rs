//! Build pipeline.
//!
//! A pipeline is an ordered list of external commands run against a prepared
//! work dir. Commands run strictly in sequence and the first one that fails
//! to run, times out, or exits non-zero aborts the pipeline. Nothing is
//! retried here.
//!
//! # Submodules
//!
//! - [`command`] - command description and the [`CommandRunner`] capability

mod command;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

pub use command::{BuildCommand, CommandOutput, CommandRunner, SystemRunner};

use crate::consts::{DEFAULT_GO_VERSION, DEST_DIR_NAME, STDERR_TAIL_LINES};
use crate::platform::BuildTarget;
use crate::source::SourceTree;

/// Go package that provides the cross-compilation toolchain.
pub const XGO_PACKAGE: &str = "github.com/karalabe/xgo";

/// Errors from running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// The process could not be started or waited on.
  #[error("({command}) waiting: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  /// The process ran but did not exit 0.
  #[error("non-zero build exit from `{command}` ({}){}", describe_exit(.code), format_stderr(.stderr))]
  NonZeroExit {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("`{command}` timed out after {timeout:?}")]
  Timeout { command: String, timeout: Duration },
}

impl PipelineError {
  /// The command line of the failing command.
  pub fn command(&self) -> &str {
    match self {
      PipelineError::Spawn { command, .. }
      | PipelineError::NonZeroExit { command, .. }
      | PipelineError::Timeout { command, .. } => command,
    }
  }
}

fn describe_exit(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("exit code {}", code),
    None => "terminated by signal".to_string(),
  }
}

fn format_stderr(stderr: &str) -> String {
  if stderr.is_empty() {
    String::new()
  } else {
    format!(":\n{}", stderr)
  }
}

/// Keep the last `STDERR_TAIL_LINES` lines of `stderr`.
fn stderr_tail(stderr: &str) -> String {
  let lines: Vec<&str> = stderr.trim_end().lines().collect();
  let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
  lines[start..].join("\n")
}

/// Settings for the cross-compilation toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
  /// Go release xgo builds with.
  pub go_version: String,
  /// Per-command timeout applied to every pipeline step.
  pub command_timeout: Option<Duration>,
}

impl Default for ToolchainConfig {
  fn default() -> Self {
    Self {
      go_version: DEFAULT_GO_VERSION.to_string(),
      command_timeout: None,
    }
  }
}

/// An ordered sequence of build commands with a known output file.
#[derive(Debug, Clone)]
pub struct Pipeline {
  commands: Vec<BuildCommand>,
  binary_filename: String,
}

impl Pipeline {
  /// A pipeline whose toolchain writes `binary_filename` into `<work_dir>/dest`.
  pub fn new(commands: Vec<BuildCommand>, binary_filename: impl Into<String>) -> Self {
    Self {
      commands,
      binary_filename: binary_filename.into(),
    }
  }

  /// The xgo pipeline: install xgo, then cross-compile the source tree for
  /// `target`.
  ///
  /// xgo is installed with the caller's own Go environment so it lands on
  /// their `PATH`; only the cross-compile sees the work dir as its GOPATH.
  pub fn xgo(source: &impl SourceTree, target: &BuildTarget, toolchain: &ToolchainConfig) -> Self {
    let gopath = source.work_dir().to_string_lossy().to_string();
    let package_dir = source.package_dir();

    let get_xgo = BuildCommand::new("go")
      .args(["get", XGO_PACKAGE])
      .timeout(toolchain.command_timeout);

    let build_binary = BuildCommand::new("xgo")
      .arg("-v")
      .args(["-targets".to_string(), target.target()])
      .arg(format!("-dest=./{}", DEST_DIR_NAME))
      .args(["-out", source.binary_prefix()])
      .args(["-go", toolchain.go_version.as_str()])
      .arg(package_dir.to_string_lossy())
      .env("GOPATH", gopath)
      .timeout(toolchain.command_timeout);

    Self::new(vec![get_xgo, build_binary], target.binary_filename(source.binary_prefix()))
  }

  #[cfg(test)]
  pub(crate) fn commands(&self) -> &[BuildCommand] {
    &self.commands
  }

  pub fn binary_filename(&self) -> &str {
    &self.binary_filename
  }

  /// Where the toolchain is expected to leave the binary for `work_dir`.
  pub fn output_path(&self, work_dir: &Path) -> PathBuf {
    work_dir.join(DEST_DIR_NAME).join(&self.binary_filename)
  }

  /// Run every command in order against `work_dir`.
  ///
  /// Returns the expected output path. Callers must check the file exists:
  /// success here only means every command exited 0.
  pub async fn run<R: CommandRunner>(&self, runner: &R, work_dir: &Path) -> Result<PathBuf, PipelineError> {
    for (idx, command) in self.commands.iter().enumerate() {
      let cwd = command.working_dir(work_dir);
      info!(step = idx + 1, total = self.commands.len(), cmd = %command, "running build command");

      let run = runner.run(command, cwd);
      let result = match command.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, run).await {
          Ok(result) => result,
          Err(_) => {
            return Err(PipelineError::Timeout {
              command: command.to_string(),
              timeout,
            });
          }
        },
        None => run.await,
      };

      let output = result.map_err(|source| PipelineError::Spawn {
        command: command.to_string(),
        source,
      })?;

      if !output.success() {
        return Err(PipelineError::NonZeroExit {
          command: command.to_string(),
          code: output.code,
          stderr: stderr_tail(&output.stderr),
        });
      }
      debug!(step = idx + 1, "build command succeeded");
    }

    Ok(self.output_path(work_dir))
  }
}
