//! External command description and execution.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// One external program invocation in a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
  pub program: String,
  pub args: Vec<String>,
  /// Working directory. `None` runs in the build's work dir.
  pub cwd: Option<PathBuf>,
  /// Variables added to (or overriding) the inherited environment.
  pub env: BTreeMap<String, String>,
  /// Kill the process and fail the build if it runs longer than this.
  pub timeout: Option<Duration>,
}

impl BuildCommand {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      env: BTreeMap::new(),
      timeout: None,
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  /// Working directory this command runs in, given the build's work dir.
  pub fn working_dir<'a>(&'a self, work_dir: &'a Path) -> &'a Path {
    self.cwd.as_deref().unwrap_or(work_dir)
  }
}

impl fmt::Display for BuildCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  /// Exit code, `None` if the process was terminated by a signal.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Capability to run a program to completion.
///
/// An `Err` means the process could not be started or waited on; a process
/// that ran and exited non-zero is an `Ok` with that code.
pub trait CommandRunner: Send + Sync {
  fn run(&self, command: &BuildCommand, cwd: &Path) -> impl Future<Output = io::Result<CommandOutput>> + Send;
}

impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
  fn run(&self, command: &BuildCommand, cwd: &Path) -> impl Future<Output = io::Result<CommandOutput>> + Send {
    (**self).run(command, cwd)
  }
}

/// Runs commands as child processes of the current process.
///
/// The child inherits the parent environment plus the command's overrides,
/// and is killed if the future driving it is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
  async fn run(&self, command: &BuildCommand, cwd: &Path) -> io::Result<CommandOutput> {
    debug!(cmd = %command, working_dir = ?cwd, "spawning process");

    let output = Command::new(&command.program)
      .args(&command.args)
      .envs(&command.env)
      .current_dir(cwd)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await?;

    let result = CommandOutput {
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };

    if !result.stdout.is_empty() {
      debug!(stdout = %result.stdout.trim_end(), "command stdout");
    }
    if !result.stderr.is_empty() {
      debug!(stderr = %result.stderr.trim_end(), "command stderr");
    }

    Ok(result)
  }
}
