use std::fmt;

/// Operating systems the cross-compilation toolchain can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the toolchain identifier for this OS (Go `GOOS` naming)
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
    }
  }

  /// Minimum OS version token the toolchain embeds in output filenames.
  pub fn min_version_token(&self) -> Option<&'static str> {
    match self {
      Self::Linux => None,
      Self::MacOs => Some("10.6"),
      Self::Windows => Some("4.0"),
    }
  }

  /// Executable suffix for binaries built for this OS.
  pub fn exe_suffix(&self) -> &'static str {
    match self {
      Self::Windows => ".exe",
      _ => "",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn current_returns_supported_os() {
    assert!(Os::current().is_some(), "Current OS should be supported");
  }

  #[test]
  fn macos_uses_darwin_identifier() {
    assert_eq!(Os::MacOs.as_str(), "darwin");
  }

  #[test]
  fn only_windows_has_exe_suffix() {
    assert_eq!(Os::Windows.exe_suffix(), ".exe");
    assert_eq!(Os::Linux.exe_suffix(), "");
    assert_eq!(Os::MacOs.exe_suffix(), "");
  }
}
