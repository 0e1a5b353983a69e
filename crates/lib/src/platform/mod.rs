//! Build target resolution.
//!
//! Maps the host OS/architecture onto the cross-compilation toolchain's target
//! string (`linux/amd64`) and onto the filename the toolchain emits for a given
//! binary prefix. The filename must match what the toolchain actually writes,
//! otherwise the build is reported as missing its artifact.

pub mod arch;
pub mod os;
pub mod paths;

use arch::Arch;
use os::Os;
use std::fmt;

/// Target of a cross-compiled build (e.g., "linux/amd64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildTarget {
  pub os: Os,
  pub arch: Arch,
}

impl BuildTarget {
  pub fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// Detect the target for the current host
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      os: Os::current()?,
      arch: Arch::current()?,
    })
  }

  /// Returns the toolchain target string (e.g., "linux/amd64")
  pub fn target(&self) -> String {
    format!("{}/{}", self.os, self.arch)
  }

  /// Returns the filename the toolchain writes for `prefix` on this target.
  ///
  /// Darwin and Windows builds carry a minimum OS version token between the
  /// OS and the architecture, e.g. `openbazaard-darwin-10.6-amd64`.
  pub fn binary_filename(&self, prefix: &str) -> String {
    match self.os.min_version_token() {
      Some(token) => format!("{}-{}-{}-{}{}", prefix, self.os, token, self.arch, self.os.exe_suffix()),
      None => format!("{}-{}-{}{}", prefix, self.os, self.arch, self.os.exe_suffix()),
    }
  }
}

impl fmt::Display for BuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.target())
  }
}
