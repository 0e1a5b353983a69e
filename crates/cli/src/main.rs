use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mason_lib::platform::paths;

mod cmd;
mod output;

use cmd::{BuildOptions, cmd_build, cmd_gc, cmd_info, cmd_list, cmd_remove, cmd_run};
use output::OutputFormat;

/// mason - build-or-reuse cross-compiled OpenBazaar daemon binaries
#[derive(Parser)]
#[command(name = "mason")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Artifact cache root (overrides MASON_CACHE)
  #[arg(long, global = true, value_name = "PATH")]
  cache: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a version, or reuse the cached build
  Build {
    /// Version reference to build (tag, branch or commit)
    version: String,

    #[command(flatten)]
    build: BuildFlags,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Build-or-reuse a version, then run it
  Run {
    /// Version reference to run (tag, branch or commit)
    version: String,

    #[command(flatten)]
    build: BuildFlags,

    /// Arguments passed to the binary
    #[arg(last = true)]
    args: Vec<String>,
  },

  /// List cached builds
  List {
    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Remove a cached build
  Remove {
    /// Version reference to remove
    version: String,

    /// Artifact name
    #[arg(long, default_value = mason_lib::consts::OPENBAZAARD)]
    artifact: String,
  },

  /// Delete cached binaries no entry references
  Gc {
    /// Show what would be deleted without deleting
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show build target and cache information
  Info,
}

#[derive(clap::Args)]
struct BuildFlags {
  /// Label used for the work dir name
  #[arg(long)]
  label: Option<String>,

  /// Go release the toolchain builds with
  #[arg(long, value_name = "VERSION")]
  go_version: Option<String>,

  /// Per-command timeout, e.g. "20m" (overrides MASON_COMMAND_TIMEOUT)
  #[arg(long, value_name = "DURATION")]
  command_timeout: Option<humantime::Duration>,

  /// Keep the work dir after the build
  #[arg(long)]
  keep_workdir: bool,
}

impl BuildFlags {
  fn into_options(self, version: String) -> BuildOptions {
    BuildOptions {
      version,
      label: self.label,
      go_version: self.go_version,
      command_timeout: self.command_timeout.map(Into::into),
      keep_workdir: self.keep_workdir,
    }
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let cache_root = cli.cache.unwrap_or_else(paths::cache_dir);

  match cli.command {
    Commands::Build { version, build, output } => cmd_build(&cache_root, build.into_options(version), output),
    Commands::Run { version, build, args } => cmd_run(&cache_root, build.into_options(version), &args),
    Commands::List { output } => cmd_list(&cache_root, output),
    Commands::Remove { version, artifact } => cmd_remove(&cache_root, &artifact, &version),
    Commands::Gc { dry_run, output } => cmd_gc(&cache_root, dry_run, output),
    Commands::Info => {
      cmd_info(&cache_root);
      Ok(())
    }
  }
}
