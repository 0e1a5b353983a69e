use std::fmt;

/// CPU architectures the cross-compilation toolchain can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  Amd64,
  Arm64,
  X86,
  Arm,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::Amd64),
      "aarch64" => Some(Self::Arm64),
      "x86" => Some(Self::X86),
      "arm" => Some(Self::Arm),
      _ => None,
    }
  }

  /// Returns the toolchain identifier for this architecture (Go `GOARCH` naming)
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Amd64 => "amd64",
      Self::Arm64 => "arm64",
      Self::X86 => "386",
      Self::Arm => "arm",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
