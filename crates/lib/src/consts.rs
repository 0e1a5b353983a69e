//! Crate-wide constants.

pub const APP_NAME: &str = "mason";

/// Directory under the home directory holding all mason state.
pub const STATE_DIR_NAME: &str = ".mason";

/// Go release the cross-compilation toolchain builds with by default.
pub const DEFAULT_GO_VERSION: &str = "1.11";

/// Artifact name the OpenBazaar daemon is cached under.
pub const OPENBAZAARD: &str = "openbazaard";

/// Subdirectory of a work dir where the toolchain writes its output.
pub const DEST_DIR_NAME: &str = "dest";

/// Number of trailing stderr lines kept when a build command fails.
pub const STDERR_TAIL_LINES: usize = 20;
