//! omnibuild - builds software components from recipes in dependency order
//!
//! This crate provides the core library functionality for omnibuild:
//! recipe loading, dependency resolution, source fetching and the
//! cached build executor.

pub mod builder;
pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

/// Test doubles for omnibuild unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides recording implementations of the process
/// runner, fetcher and extractor.
#[cfg(test)]
pub mod test_support;

pub use builder::{BuildCache, BuildContext, BuildExecutor, InstallResult};
pub use core::{BuildGraph, Component, Step, TargetPlatform};
pub use util::context::GlobalContext;
