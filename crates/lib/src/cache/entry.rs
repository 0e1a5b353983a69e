//! Cache keys and the on-disk entry record.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::CacheError;
use crate::util::hash::ContentHash;

/// Entry record format version.
pub const ENTRY_FORMAT_VERSION: u32 = 1;

/// Directory (relative to the cache root) holding committed binaries.
pub const OBJECTS_DIR: &str = "objects";

/// Identifies one cached binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
  pub artifact: String,
  pub version: String,
}

impl CacheKey {
  /// Validate and build a key.
  ///
  /// The artifact name is used verbatim as a directory name, so it is limited
  /// to `[A-Za-z0-9._-]`. The version may be any git reference; it is escaped
  /// when mapped onto a filename.
  pub fn new(artifact: &str, version: &str) -> Result<Self, CacheError> {
    if artifact.is_empty() || version.is_empty() {
      return Err(invalid(artifact, version, "artifact and version must be non-empty"));
    }
    if matches!(artifact, "." | "..") || matches!(version, "." | "..") {
      return Err(invalid(artifact, version, "'.' and '..' are reserved"));
    }
    if !artifact.bytes().all(is_plain_byte) {
      return Err(invalid(artifact, version, "artifact may only contain [A-Za-z0-9._-]"));
    }
    if version.contains('\0') {
      return Err(invalid(artifact, version, "version may not contain NUL"));
    }
    Ok(Self {
      artifact: artifact.to_string(),
      version: version.to_string(),
    })
  }

  /// Filename of the entry record for this key (`<escaped-version>.json`).
  pub fn record_filename(&self) -> String {
    format!("{}.json", escape_version(&self.version))
  }
}

impl std::fmt::Display for CacheKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}@{}", self.artifact, self.version)
  }
}

fn invalid(artifact: &str, version: &str, reason: &'static str) -> CacheError {
  CacheError::InvalidKey {
    key: format!("{}@{}", artifact, version),
    reason,
  }
}

fn is_plain_byte(b: u8) -> bool {
  b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}

/// Escape a version reference into a single filename component.
///
/// Bytes outside `[A-Za-z0-9._-]` become `%XX`, so `feature/x` maps to
/// `feature%2Fx` and cannot escape its directory.
pub fn escape_version(version: &str) -> String {
  let mut out = String::with_capacity(version.len());
  for b in version.bytes() {
    if is_plain_byte(b) {
      out.push(b as char);
    } else {
      out.push_str(&format!("%{:02X}", b));
    }
  }
  out
}

/// Persisted record mapping a key to a committed binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// Record format version.
  pub format: u32,
  pub artifact: String,
  pub version: String,
  /// Object path relative to the cache root, `/`-separated
  /// (`objects/<sha256>/<filename>`).
  pub object: String,
  pub sha256: String,
  pub size: u64,
  pub committed_at_unix: u64,
}

impl CacheEntry {
  pub fn key(&self) -> CacheKey {
    CacheKey {
      artifact: self.artifact.clone(),
      version: self.version.clone(),
    }
  }

  /// Relative object path for a binary with `hash` and `filename`.
  pub fn object_path_for(hash: &ContentHash, filename: &str) -> String {
    format!("{}/{}/{}", OBJECTS_DIR, hash.0, filename)
  }

  /// Resolve the object path against `root`.
  ///
  /// Returns `None` if the recorded path is not of the form
  /// `objects/<sha256>/<filename>` or its hash disagrees with `sha256`.
  pub fn resolve_object(&self, root: &Path) -> Option<PathBuf> {
    let mut parts = self.object.split('/');
    let (dir, hash, filename) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || dir != OBJECTS_DIR || hash != self.sha256 {
      return None;
    }
    if !ContentHash::is_well_formed(hash) {
      return None;
    }
    if filename.is_empty() || matches!(filename, "." | "..") || filename.contains('\\') {
      return None;
    }
    Some(root.join(OBJECTS_DIR).join(hash).join(filename))
  }
}
