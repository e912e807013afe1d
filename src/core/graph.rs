//! The build graph and dependency-ordered resolution.

use std::collections::{BTreeMap, HashMap};

use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::core::component::Component;
use crate::util::diagnostic::Diagnostic;

/// Error raised while resolving the build order.
///
/// These are configuration errors and are reported before any build starts.
#[derive(Debug, Clone, PartialEq, Eq, Error, miette::Diagnostic)]
pub enum GraphError {
    #[error("component `{name}` is not defined")]
    #[diagnostic(code(omnibuild::graph::unknown_component))]
    UnknownComponent { name: String, available: Vec<String> },

    #[error("component `{component}` depends on `{dependency}`, which is not defined")]
    #[diagnostic(
        code(omnibuild::graph::unknown_dependency),
        help("add a recipe for the missing component or remove the dependency")
    )]
    UnknownDependency {
        component: String,
        dependency: String,
    },

    #[error("dependency cycle detected: {}", path.join(" -> "))]
    #[diagnostic(
        code(omnibuild::graph::cycle),
        help("break the cycle by removing one of the dependencies")
    )]
    Cycle { path: Vec<String> },
}

impl GraphError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            GraphError::UnknownComponent { name, available } => {
                let mut diag = Diagnostic::error(format!("component `{}` is not defined", name));
                if !available.is_empty() {
                    diag = diag.with_context(format!("available components: {}", available.join(", ")));
                }
                diag.with_suggestion("Run `omnibuild plan --list` to see all components")
            }
            GraphError::UnknownDependency {
                component,
                dependency,
            } => Diagnostic::error(format!("unknown dependency `{}`", dependency))
                .with_context(format!("required by `{}`", component))
                .with_suggestion(format!("Add a recipe named `{}`", dependency))
                .with_suggestion(format!("Remove `{}` from the dependencies of `{}`", dependency, component)),
            GraphError::Cycle { path } => Diagnostic::error("cycle detected in dependency graph")
                .with_context(format!("cycle: {}", path.join(" -> ")))
                .with_suggestion("Break the cycle by removing or restructuring dependencies"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current recursion path
    Active,
    Done,
}

/// Mapping from component name to component. One component per name.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    components: BTreeMap<String, Component>,
}

impl BuildGraph {
    pub fn new() -> Self {
        BuildGraph::default()
    }

    /// Add a component, replacing any previous definition with the same name.
    ///
    /// Returns the replaced definition.
    pub fn insert(&mut self, component: Component) -> Option<Component> {
        let previous = self.components.insert(component.name.clone(), component);
        if let Some(ref prev) = previous {
            tracing::debug!("redefining component `{}`", prev.name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Resolve the build order for `target`.
    ///
    /// Depth-first from `target`: every dependency comes before its
    /// dependent and each component appears exactly once.
    pub fn resolve_order(&self, target: &str) -> Result<Vec<&Component>, GraphError> {
        let root = self
            .components
            .get(target)
            .ok_or_else(|| GraphError::UnknownComponent {
                name: target.to_string(),
                available: self.names().iter().map(|s| s.to_string()).collect(),
            })?;

        let mut marks = HashMap::new();
        let mut path = Vec::new();
        let mut order = Vec::new();
        self.visit(root, &mut marks, &mut path, &mut order)?;
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        component: &'a Component,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<&'a Component>,
    ) -> Result<(), GraphError> {
        match marks.get(component.name.as_str()) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Active) => {
                let start = path
                    .iter()
                    .position(|n| *n == component.name)
                    .unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(component.name.clone());
                return Err(GraphError::Cycle { path: cycle });
            }
            None => {}
        }

        marks.insert(&component.name, Mark::Active);
        path.push(&component.name);

        for dep in &component.dependencies {
            let dep_component =
                self.components
                    .get(dep)
                    .ok_or_else(|| GraphError::UnknownDependency {
                        component: component.name.clone(),
                        dependency: dep.clone(),
                    })?;
            self.visit(dep_component, marks, path, order)?;
        }

        path.pop();
        marks.insert(&component.name, Mark::Done);
        order.push(component);
        Ok(())
    }

    /// Check every component for unknown dependencies and cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        for name in self.components.keys() {
            self.resolve_order(name)?;
        }
        Ok(())
    }

    /// Render the whole graph as Graphviz DOT. Edges point from a
    /// component to its dependencies; unknown dependencies are omitted.
    pub fn to_dot(&self) -> String {
        let mut graph: DiGraph<&str, &str> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

        for name in self.components.keys() {
            nodes.insert(name.as_str(), graph.add_node(name.as_str()));
        }
        for component in self.components.values() {
            let from = nodes[component.name.as_str()];
            for dep in &component.dependencies {
                if let Some(&to) = nodes.get(dep.as_str()) {
                    graph.add_edge(from, to, "");
                }
            }
        }

        format!("{}", Dot::with_config(&graph, &[DotConfig::EdgeNoLabel]))
    }
}

impl FromIterator<Component> for BuildGraph {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        let mut graph = BuildGraph::new();
        for component in iter {
            graph.insert(component);
        }
        graph
    }
}
