//! Build execution.
//!
//! This module contains:
//! - Build context shared by every component of a run
//! - The content-addressed build cache
//! - Step execution and the dependency-ordered executor
//! - Machine-readable build events

pub mod cache;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod step;

pub use cache::{BuildCache, CacheEntry, CacheKey};
pub use context::BuildContext;
pub use error::{BuildError, ExecuteError, StepFailure};
pub use events::{BuildEvent, EventSink, JsonSink, NullSink};
pub use executor::{BuildExecutor, Collaborators, InstallResult};
