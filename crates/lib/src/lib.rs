//! mason-lib: build-or-reuse orchestration for cross-compiled binaries
//!
//! This crate provides the pieces behind the `mason` CLI:
//! - `ArtifactCache`: on-disk, content-addressed store of built binaries
//! - `BuildTarget`: host OS/architecture and the toolchain's naming rules
//! - `Pipeline`: ordered external build commands with exit-code checking
//! - `Builder`: checks the cache and builds under a lock on a miss
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary.

pub mod builder;
pub mod cache;
pub mod consts;
pub mod pipeline;
pub mod platform;
pub mod runner;
pub mod source;
pub mod util;
