//! Implementation of `omnibuild plan`.
//!
//! Shows what a build would do without running anything.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::builder::{BuildCache, CacheKey};
use crate::core::{BuildGraph, GraphError, TargetPlatform};

/// Whether a planned component would be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanStatus {
    /// A cache entry for the same key, install dir and platform exists
    Cached,
    /// Would be built
    Stale,
}

/// One component in a build plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub name: String,
    pub version: String,
    pub key: String,
    pub status: PlanStatus,
    pub dependencies: Vec<String>,
    /// Steps whose condition holds on the target platform
    pub steps: usize,
    /// Steps that would be skipped on the target platform
    pub skipped: usize,
}

/// Resolve `target` and report, in build order, whether each component
/// would be built or reused from `cache`.
pub fn plan(
    graph: &BuildGraph,
    target: &str,
    cache: &mut BuildCache,
    install_dir: &Path,
    platform: &TargetPlatform,
) -> Result<Vec<PlanEntry>, GraphError> {
    let order = graph.resolve_order(target)?;

    Ok(order
        .into_iter()
        .map(|component| {
            let key = CacheKey::for_component(component);
            let cached = cache
                .get(&key)
                .is_some_and(|entry| entry.reusable_for(install_dir, platform));
            let steps = component
                .steps
                .iter()
                .filter(|step| step.condition.matches(platform))
                .count();

            PlanEntry {
                name: component.name.clone(),
                version: component.version.clone(),
                key: key.to_string(),
                status: if cached {
                    PlanStatus::Cached
                } else {
                    PlanStatus::Stale
                },
                dependencies: component.dependencies.clone(),
                steps,
                skipped: component.steps.len() - steps,
            }
        })
        .collect())
}

/// Format a plan for the terminal.
pub fn format_plan(entries: &[PlanEntry]) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let status = match entry.status {
            PlanStatus::Cached => "cached",
            PlanStatus::Stale => "stale",
        };
        let _ = write!(
            out,
            "{:>3}. {:<6} {} v{} ({} step{}",
            i + 1,
            status,
            entry.name,
            entry.version,
            entry.steps,
            if entry.steps == 1 { "" } else { "s" }
        );
        if entry.skipped > 0 {
            let _ = write!(out, ", {} skipped", entry.skipped);
        }
        out.push(')');
        if !entry.dependencies.is_empty() {
            let _ = write!(out, " <- {}", entry.dependencies.join(", "));
        }
        out.push('\n');
    }
    out
}

/// List every component in the graph, sorted by name.
pub fn format_list(graph: &BuildGraph) -> String {
    let mut out = String::new();
    for component in graph.components() {
        let _ = writeln!(out, "{} v{}", component.name, component.version);
    }
    out
}
