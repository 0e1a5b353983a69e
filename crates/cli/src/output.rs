//! Terminal rendering for mason's commands.
//!
//! Human output is a status line followed by indented fields; `-o json`
//! replaces both with one pretty-printed document on stdout.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use mason_lib::cache::CacheEntry;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Leading marker of a status line.
#[derive(Debug, Clone, Copy)]
pub enum Status {
  Done,
  Note,
  Failed,
}

impl Status {
  fn marker(self) -> &'static str {
    match self {
      Status::Done => "✓",
      Status::Note => "•",
      Status::Failed => "✗",
    }
  }
}

/// Print a status line. Failures go to stderr so they never mix with JSON.
pub fn status(kind: Status, message: &str) {
  match kind {
    Status::Done => println!("{} {}", kind.marker().if_supports_color(Stream::Stdout, |m| m.green()), message),
    Status::Note => println!("{} {}", kind.marker().if_supports_color(Stream::Stdout, |m| m.blue()), message),
    Status::Failed => eprintln!(
      "{} {}",
      kind.marker().if_supports_color(Stream::Stderr, |m| m.red()),
      message.if_supports_color(Stream::Stderr, |m| m.red())
    ),
  }
}

/// Print an indented `label: value` line under a status line.
pub fn field(label: &str, value: impl std::fmt::Display) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |l| l.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Binary size with one decimal in the largest unit that keeps it >= 1.
pub fn size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Wall time rounded to milliseconds, e.g. `2m 5s 30ms`.
pub fn elapsed(duration: Duration) -> String {
  let rounded = Duration::from_millis(duration.as_millis().try_into().unwrap_or(u64::MAX));
  humantime::format_duration(rounded).to_string()
}

/// Column header matching [`entry_row`].
pub fn entry_header() -> String {
  format!("{:<16} {:<24} {:>10}  {}", "ARTIFACT", "VERSION", "SIZE", "SHA256")
}

/// One `mason list` line: key, size and the first 12 hex digits of the hash.
pub fn entry_row(entry: &CacheEntry) -> String {
  let short = entry.sha256.get(..12).unwrap_or(&entry.sha256);
  format!("{:<16} {:<24} {:>10}  {}", entry.artifact, entry.version, size(entry.size), short)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(version: &str, size: u64, sha256: &str) -> CacheEntry {
    CacheEntry {
      format: 1,
      artifact: "openbazaard".to_string(),
      version: version.to_string(),
      object: format!("objects/{}/openbazaard-linux-amd64", sha256),
      sha256: sha256.to_string(),
      size,
      committed_at_unix: 0,
    }
  }

  #[test]
  fn sizes_pick_the_largest_whole_unit() {
    assert_eq!(size(0), "0 B");
    assert_eq!(size(1023), "1023 B");
    assert_eq!(size(1536), "1.5 KiB");
    assert_eq!(size(48 * 1024 * 1024), "48.0 MiB");
    assert_eq!(size(3 * 1024 * 1024 * 1024), "3.0 GiB");
  }

  #[test]
  fn elapsed_drops_sub_millisecond_noise() {
    assert_eq!(elapsed(Duration::from_micros(1_500_700)), "1s 500ms");
    assert_eq!(elapsed(Duration::from_secs(125)), "2m 5s");
  }

  #[test]
  fn entry_row_lines_up_with_header() {
    let hash = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
    let row = entry_row(&entry("v1.2.0", 48 * 1024 * 1024, hash));

    assert!(row.starts_with("openbazaard      v1.2.0"), "{}", row);
    assert!(row.ends_with("48.0 MiB  b94d27b9934d"), "{}", row);
    assert_eq!(row.find("v1.2.0"), entry_header().find("VERSION"));
  }

  #[test]
  fn entry_row_keeps_short_hashes_whole() {
    assert!(entry_row(&entry("v1", 1, "abc")).ends_with("1 B  abc"));
  }
}
