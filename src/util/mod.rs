//! Shared utilities

pub mod config;
pub mod context;
pub mod diagnostic;
pub mod fs;
pub mod hash;
pub mod process;
pub mod template;

pub use config::Config;
pub use context::GlobalContext;
pub use diagnostic::Diagnostic;
pub use process::{CommandSpec, ProcessOutput, ProcessRunner, ShellRunner};
pub use template::{PlaceholderTemplater, TemplateError, Templater};
