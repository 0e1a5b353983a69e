//! Test utilities for mason-lib.
//!
//! Cross-platform helpers for tests that need to execute shell commands, plus
//! recording fakes for the command runner and source blueprint seams.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::pipeline::{BuildCommand, CommandOutput, CommandRunner};

/// A command that runs `script` through the platform shell.
#[cfg(unix)]
pub fn shell(script: &str) -> BuildCommand {
  BuildCommand::new("/bin/sh").args(["-c", script])
}

#[cfg(windows)]
pub fn shell(script: &str) -> BuildCommand {
  BuildCommand::new("cmd.exe").args(["/C", script])
}

/// A command that creates an empty file in the current directory.
#[cfg(unix)]
pub fn touch_file(filename: &str) -> BuildCommand {
  BuildCommand::new("/usr/bin/touch").arg(filename)
}

#[cfg(windows)]
pub fn touch_file(filename: &str) -> BuildCommand {
  BuildCommand::new("powershell.exe").args([
    "-NoProfile".to_string(),
    "-Command".to_string(),
    format!("New-Item -ItemType File -Path '{}' -Force | Out-Null", filename),
  ])
}

/// What a [`FakeRunner`] does for one invocation.
#[derive(Debug, Clone)]
pub enum Scripted {
  /// Exit with this code.
  Exit(i32),
  /// Exit with this code after writing stderr.
  ExitWithStderr(i32, String),
  /// Write `content` to `relative` (under the cwd), then exit 0.
  Produce { relative: PathBuf, content: String },
  /// Fail to start.
  SpawnError,
  /// Never finish.
  Hang,
}

/// Records every command it is asked to run and replays scripted outcomes.
///
/// Once the script is exhausted, every further command exits 0.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
  script: Arc<Mutex<VecDeque<Scripted>>>,
  calls: Arc<Mutex<Vec<(BuildCommand, PathBuf)>>>,
}

impl FakeRunner {
  pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
    Self {
      script: Arc::new(Mutex::new(script.into_iter().collect())),
      calls: Arc::default(),
    }
  }

  pub fn calls(&self) -> Vec<(BuildCommand, PathBuf)> {
    self.calls.lock().unwrap().clone()
  }

  pub fn programs(&self) -> Vec<String> {
    self.calls().into_iter().map(|(c, _)| c.program).collect()
  }
}

impl CommandRunner for FakeRunner {
  async fn run(&self, command: &BuildCommand, cwd: &Path) -> io::Result<CommandOutput> {
    self.calls.lock().unwrap().push((command.clone(), cwd.to_path_buf()));
    let next = self.script.lock().unwrap().pop_front().unwrap_or(Scripted::Exit(0));

    match next {
      Scripted::Exit(code) => Ok(CommandOutput {
        code: Some(code),
        ..Default::default()
      }),
      Scripted::ExitWithStderr(code, stderr) => Ok(CommandOutput {
        code: Some(code),
        stderr,
        ..Default::default()
      }),
      Scripted::Produce { relative, content } => {
        let path = cwd.join(relative);
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(path, content)?;
        Ok(CommandOutput {
          code: Some(0),
          ..Default::default()
        })
      }
      Scripted::SpawnError => Err(io::Error::new(io::ErrorKind::NotFound, "program not found")),
      Scripted::Hang => std::future::pending().await,
    }
  }
}
