//! Build failures.

use thiserror::Error;

use crate::core::graph::GraphError;
use crate::sources::{ExtractError, FetchError};
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::template::TemplateError;

/// Why a component's build stopped.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("`{command}` {}{}", describe_exit(.code), output_block(.output))]
    Exited {
        command: String,
        code: Option<i32>,
        /// Captured stdout followed by stderr
        output: String,
    },

    #[error("failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("{0}")]
    Io(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl StepFailure {
    /// Wrap an `anyhow` error from the filesystem helpers.
    pub fn io(err: anyhow::Error) -> Self {
        StepFailure::Io(format!("{:#}", err))
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

fn output_block(output: &str) -> String {
    if output.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}", output.trim_end())
    }
}

/// A component failed to build.
///
/// `step_index` is the declared index of the failing step; steps skipped
/// by their platform condition still count. It is `None` when the failure
/// happened before any step ran (fetching or unpacking the source).
#[derive(Debug, Error, miette::Diagnostic)]
#[error("failed to build `{component}`{}: {cause}", describe_step(.step_index))]
#[diagnostic(
    code(omnibuild::build::failed),
    help("fix the failing step and run the build again; completed components are cached")
)]
pub struct BuildError {
    /// Component identifier, e.g. `zlib v1.2.11`
    pub component: String,
    pub step_index: Option<usize>,
    pub cause: StepFailure,
}

fn describe_step(step_index: &Option<usize>) -> String {
    match step_index {
        Some(i) => format!(" at step {}", i),
        None => String::new(),
    }
}

impl BuildError {
    pub fn new(component: impl Into<String>, step_index: Option<usize>, cause: StepFailure) -> Self {
        BuildError {
            component: component.into(),
            step_index,
            cause,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(format!("failed to build `{}`", self.component));

        let context = match self.step_index {
            Some(i) => format!("step {}: {}", i, self.cause),
            None => self.cause.to_string(),
        };
        diag = diag.with_context(context);

        match self.cause {
            StepFailure::Fetch(FetchError::ChecksumMismatch { .. }) => diag
                .with_suggestion("Update the checksum in the recipe if the new artifact is trusted"),
            StepFailure::Fetch(_) => diag.with_suggestion(suggestions::FETCH_FAILED),
            _ => diag.with_suggestion(suggestions::BUILD_FAILED),
        }
    }
}

/// Error from executing a target's whole build order.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum ExecuteError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Build(#[from] BuildError),
}

impl ExecuteError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ExecuteError::Graph(e) => e.to_diagnostic(),
            ExecuteError::Build(e) => e.to_diagnostic(),
        }
    }
}
