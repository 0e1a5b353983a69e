//! Hashing utilities for content-addressed cache objects.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A full 64-character SHA256 hash for content verification.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl ContentHash {
  /// Whether this looks like a hash we produced (64 lowercase hex chars).
  pub fn is_well_formed(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
  }
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut file = fs::File::open(path)?;
  copy_and_hash(&mut file, &mut io::sink()).map(|(hash, _)| hash)
}

/// Copy `reader` into `writer`, hashing the bytes as they pass through.
///
/// Returns the hash and the number of bytes copied.
pub fn copy_and_hash<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<(ContentHash, u64)> {
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];
  let mut total = 0u64;

  loop {
    let bytes_read = match reader.read(&mut buffer) {
      Ok(0) => break,
      Ok(n) => n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    };
    hasher.update(&buffer[..bytes_read]);
    writer.write_all(&buffer[..bytes_read])?;
    total += bytes_read as u64;
  }

  Ok((ContentHash(hex::encode(hasher.finalize())), total))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}
