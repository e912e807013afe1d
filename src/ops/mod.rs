//! High-level operations.
//!
//! This module contains the implementation of omnibuild commands.

pub mod build;
pub mod clean;
pub mod plan;

pub use build::{build, build_graph, load_graph, BuildOptions, BuildSummary};
pub use clean::{clean, CleanOptions, CleanResult};
pub use plan::{format_list, format_plan, plan, PlanEntry, PlanStatus};
