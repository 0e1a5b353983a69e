use std::io;
use std::path::PathBuf;

use tracing::warn;

use crate::consts::{APP_NAME, STATE_DIR_NAME};

/// Environment variable overriding the cache root.
pub const CACHE_ENV: &str = "MASON_CACHE";

/// Returns the user's home directory, if one is resolvable
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var("USERPROFILE")
    .ok()
    .filter(|p| !p.is_empty())
    .map(PathBuf::from)
}

/// Returns the user's home directory, if one is resolvable
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var("HOME").ok().filter(|p| !p.is_empty()).map(PathBuf::from)
}

/// Returns the directory holding mason state (`<home>/.mason`).
///
/// Falls back to `./.mason` when no home directory is resolvable.
pub fn state_dir() -> PathBuf {
  match home_dir() {
    Some(home) => home.join(STATE_DIR_NAME),
    None => {
      warn!("home directory is unset, using current path");
      PathBuf::from(".").join(STATE_DIR_NAME)
    }
  }
}

/// Returns the artifact cache root.
///
/// `MASON_CACHE` takes precedence over `<home>/.mason/cache`.
pub fn cache_dir() -> PathBuf {
  if let Ok(path) = std::env::var(CACHE_ENV)
    && !path.is_empty()
  {
    return PathBuf::from(path);
  }

  state_dir().join("cache")
}

/// Create a fresh, uniquely named work directory for one build attempt.
///
/// The directory lives in the system temp directory and is *not* removed
/// automatically; the owning builder removes it on explicit cleanup.
pub fn temp_build_dir(label: &str) -> io::Result<PathBuf> {
  let dir = tempfile::Builder::new()
    .prefix(&format!("{}-{}-", APP_NAME, sanitize_label(label)))
    .tempdir()?;
  Ok(dir.keep())
}

fn sanitize_label(label: &str) -> String {
  let cleaned: String = label
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
    .collect();
  if cleaned.is_empty() { "build".to_string() } else { cleaned }
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn cache_env_takes_precedence() {
    temp_env::with_vars(
      [(CACHE_ENV, Some("/custom/cache")), ("HOME", Some("/home/user"))],
      || {
        assert_eq!(cache_dir(), PathBuf::from("/custom/cache"));
      },
    );
  }

  #[test]
  #[serial]
  fn cache_defaults_under_home() {
    temp_env::with_vars([(CACHE_ENV, None::<&str>), ("HOME", Some("/home/user"))], || {
      assert_eq!(cache_dir(), PathBuf::from("/home/user/.mason/cache"));
    });
  }

  #[test]
  #[serial]
  fn empty_home_falls_back_to_current_dir() {
    temp_env::with_vars([(CACHE_ENV, None::<&str>), ("HOME", Some(""))], || {
      assert_eq!(home_dir(), None);
      assert_eq!(cache_dir(), PathBuf::from("./.mason/cache"));
    });
  }

  #[test]
  fn temp_build_dirs_are_unique() {
    let a = temp_build_dir("qa node").unwrap();
    let b = temp_build_dir("qa node").unwrap();

    assert_ne!(a, b);
    assert!(a.is_dir());
    assert!(a.file_name().unwrap().to_str().unwrap().starts_with("mason-qa_node-"));

    std::fs::remove_dir_all(a).unwrap();
    std::fs::remove_dir_all(b).unwrap();
  }
}
