//! CLI smoke tests for mason.
//!
//! These tests verify that every command runs without panicking and returns
//! appropriate exit codes. None of them reach the network: builds are served
//! from a cache seeded through `mason_lib`.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use mason_lib::cache::ArtifactCache;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Get a Command for the mason binary with the cache pointed at `cache`.
fn mason_cmd(cache: &Path) -> Command {
  let mut cmd = cargo_bin_cmd!("mason");
  cmd.env("MASON_CACHE", cache).env_remove("MASON_COMMAND_TIMEOUT");
  cmd
}

/// Commit a fake daemon binary for `version` into the cache at `root`.
fn seed_cache(root: &Path, version: &str, script: &str) -> PathBuf {
  let staging = TempDir::new().unwrap();
  let binary = staging.path().join("openbazaard-linux-amd64");
  std::fs::write(&binary, script).unwrap();
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
  }

  let cache = ArtifactCache::open_or_create(root).unwrap();
  cache.cache("openbazaard", version, &binary).unwrap();
  cache.get("openbazaard", version).unwrap()
}

const EXIT_WITH_ARG: &str = "#!/bin/sh\nexit \"$1\"\n";

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let temp = TempDir::new().unwrap();
  mason_cmd(temp.path())
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  let temp = TempDir::new().unwrap();
  mason_cmd(temp.path())
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("mason"));
}

#[test]
fn subcommand_help_works() {
  let temp = TempDir::new().unwrap();
  for cmd in &["build", "run", "list", "remove", "gc", "info"] {
    mason_cmd(temp.path())
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn build_requires_version() {
  let temp = TempDir::new().unwrap();
  mason_cmd(temp.path()).arg("build").assert().failure();
}

// =============================================================================
// info
// =============================================================================

#[test]
fn info_shows_target_and_cache() {
  let temp = TempDir::new().unwrap();
  let cache = temp.path().join("cache");

  mason_cmd(temp.path())
    .arg("info")
    .arg("--cache")
    .arg(&cache)
    .assert()
    .success()
    .stdout(predicate::str::contains("System:"))
    .stdout(predicate::str::contains("Source: https://github.com/OpenBazaar/openbazaar-go.git"))
    .stdout(predicate::str::contains(cache.display().to_string()));
}

// =============================================================================
// build
// =============================================================================

#[test]
#[serial]
fn build_reuses_cached_binary() {
  let temp = TempDir::new().unwrap();
  let cached = seed_cache(temp.path(), "v1.2.0", EXIT_WITH_ARG);

  mason_cmd(temp.path())
    .args(["build", "v1.2.0"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Using cached openbazaard v1.2.0"))
    .stdout(predicate::str::contains(cached.display().to_string()));
}

#[test]
#[serial]
fn build_json_reports_cache_hit() {
  let temp = TempDir::new().unwrap();
  seed_cache(temp.path(), "v1.2.0", EXIT_WITH_ARG);

  mason_cmd(temp.path())
    .args(["build", "v1.2.0", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"cached\": true"))
    .stdout(predicate::str::contains("\"version\": \"v1.2.0\""));
}

#[test]
#[serial]
fn build_rejects_bad_timeout() {
  let temp = TempDir::new().unwrap();

  mason_cmd(temp.path())
    .args(["build", "v1.2.0", "--command-timeout", "soon"])
    .assert()
    .failure();
}

#[test]
#[serial]
fn build_rejects_bad_timeout_env() {
  let temp = TempDir::new().unwrap();

  mason_cmd(temp.path())
    .env("MASON_COMMAND_TIMEOUT", "soon")
    .args(["build", "v1.2.0"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("MASON_COMMAND_TIMEOUT"));
}

// =============================================================================
// run
// =============================================================================

#[test]
#[serial]
#[cfg(unix)]
fn run_forwards_args_and_exit_code() {
  let temp = TempDir::new().unwrap();
  seed_cache(temp.path(), "v1.2.0", EXIT_WITH_ARG);

  mason_cmd(temp.path())
    .args(["run", "v1.2.0", "--", "3"])
    .assert()
    .code(3);

  mason_cmd(temp.path())
    .args(["run", "v1.2.0", "--", "0"])
    .assert()
    .success();
}

// =============================================================================
// list / remove
// =============================================================================

#[test]
#[serial]
fn list_empty_cache() {
  let temp = TempDir::new().unwrap();

  mason_cmd(temp.path())
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("No cached builds"));
}

#[test]
#[serial]
fn list_shows_entries_and_remove_deletes_them() {
  let temp = TempDir::new().unwrap();
  seed_cache(temp.path(), "v1.2.0", "one");
  seed_cache(temp.path(), "v1.3.0", "two");

  mason_cmd(temp.path())
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("v1.2.0"))
    .stdout(predicate::str::contains("v1.3.0"));

  mason_cmd(temp.path())
    .args(["remove", "v1.2.0"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed openbazaard v1.2.0"));

  mason_cmd(temp.path())
    .args(["list", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("v1.3.0"))
    .stdout(predicate::str::contains("v1.2.0").not());
}

#[test]
#[serial]
fn remove_missing_entry_succeeds() {
  let temp = TempDir::new().unwrap();

  mason_cmd(temp.path())
    .args(["remove", "v0.0.1"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No cached build"));
}

// =============================================================================
// gc
// =============================================================================

#[test]
#[serial]
fn gc_on_empty_cache() {
  let temp = TempDir::new().unwrap();

  mason_cmd(temp.path())
    .arg("gc")
    .assert()
    .success()
    .stdout(predicate::str::contains("Garbage collection complete"));
}

#[test]
#[serial]
fn gc_frees_removed_builds() {
  let temp = TempDir::new().unwrap();
  let object = seed_cache(temp.path(), "v1.2.0", "daemon");

  mason_cmd(temp.path()).args(["remove", "v1.2.0"]).assert().success();

  mason_cmd(temp.path())
    .args(["gc", "--dry-run", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"dry_run\": true"))
    .stdout(predicate::str::contains("\"objects_deleted\": 1"));
  assert!(object.exists());

  mason_cmd(temp.path()).arg("gc").assert().success();
  assert!(!object.exists());
}
