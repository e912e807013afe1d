//! Core data structures for omnibuild.
//!
//! This module contains the foundational types used throughout omnibuild:
//! - Components and their build steps
//! - Target platforms and step predicates
//! - The build graph and its resolution
//! - Recipe file loading

pub mod component;
pub mod graph;
pub mod platform;
pub mod recipe;

pub use component::{Checksum, Component, SourceDescriptor, Step, StepKind};
pub use graph::{BuildGraph, GraphError};
pub use platform::{PlatformCondition, TargetPlatform};
pub use recipe::{load_dir, load_recipe, parse_recipe, LoadOptions, RecipeError};
