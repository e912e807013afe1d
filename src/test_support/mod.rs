//! Test doubles for the build collaborators.
//!
//! These record every call so tests can assert on what the executor asked
//! for, and can be scripted to fail.
//!
//! # Example
//!
//! ```rust,ignore
//! use omnibuild::test_support::RecordingRunner;
//!
//! let runner = RecordingRunner::new().respond("configure", ProcessOutput { code: Some(1), .. });
//! // Hand `&runner` to a BuildExecutor, then inspect runner.calls()
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::core::component::SourceDescriptor;
use crate::sources::{ExtractError, Extractor, FetchContext, FetchError, Fetcher};
use crate::util::process::{CommandSpec, ProcessOutput, ProcessRunner};

/// Pattern for matching command lines.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on the full command line.
    Exact(String),
    /// Match if the command line contains the substring.
    Contains(String),
}

impl CommandPattern {
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::Contains(s) => cmd.contains(s.as_str()),
        }
    }
}

/// Process runner that records commands instead of running them.
///
/// Commands succeed with empty output unless a scripted response matches.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    responses: Vec<(CommandPattern, ProcessOutput)>,
    spawn_failures: Vec<CommandPattern>,
    calls: RefCell<Vec<CommandSpec>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        RecordingRunner::default()
    }

    /// Return `output` for commands containing `substring`.
    pub fn respond(mut self, substring: &str, output: ProcessOutput) -> Self {
        self.responses
            .push((CommandPattern::Contains(substring.to_string()), output));
        self
    }

    /// Exit with `code` for commands containing `substring`.
    pub fn fail(self, substring: &str, code: i32) -> Self {
        self.respond(
            substring,
            ProcessOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: format!("{}: failed", substring),
            },
        )
    }

    /// Fail to start commands exactly equal to `command`.
    pub fn fail_to_spawn(mut self, command: &str) -> Self {
        self.spawn_failures
            .push(CommandPattern::Exact(command.to_string()));
        self
    }

    /// All commands run so far.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    /// Command lines run so far.
    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.command.clone()).collect()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        self.calls.borrow_mut().push(spec.clone());

        if self.spawn_failures.iter().any(|p| p.matches(&spec.command)) {
            bail!("No such file or directory (os error 2)");
        }

        for (pattern, output) in &self.responses {
            if pattern.matches(&spec.command) {
                return Ok(output.clone());
            }
        }

        Ok(ProcessOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Fetcher that hands back a prepared file instead of downloading.
#[derive(Debug, Default)]
pub struct StubFetcher {
    artifact: Option<PathBuf>,
    mismatch: bool,
    calls: RefCell<Vec<SourceDescriptor>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        StubFetcher::default()
    }

    /// Return `path` for every URL source.
    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact = Some(path.into());
        self
    }

    /// Report a checksum mismatch for every URL source.
    pub fn with_checksum_mismatch(mut self) -> Self {
        self.mismatch = true;
        self
    }

    pub fn calls(&self) -> Vec<SourceDescriptor> {
        self.calls.borrow().clone()
    }
}

impl Fetcher for StubFetcher {
    fn fetch(&self, source: &SourceDescriptor, _ctx: &FetchContext) -> Result<PathBuf, FetchError> {
        self.calls.borrow_mut().push(source.clone());

        match source {
            SourceDescriptor::Path { path } => Ok(path.clone()),
            SourceDescriptor::Url { url, checksum, .. } => {
                if self.mismatch {
                    return Err(FetchError::ChecksumMismatch {
                        url: url.clone(),
                        expected: checksum
                            .as_ref()
                            .map(|c| c.value().to_string())
                            .unwrap_or_default(),
                        actual: "0".repeat(64),
                    });
                }
                self.artifact.clone().ok_or_else(|| FetchError::Network {
                    url: url.clone(),
                    message: "no artifact prepared".to_string(),
                })
            }
        }
    }
}

/// Extractor that records calls and creates the destination directory.
#[derive(Debug, Default)]
pub struct RecordingExtractor {
    /// Directories to create inside the destination, like an archive's top level
    creates: Vec<String>,
    calls: RefCell<Vec<(PathBuf, PathBuf)>>,
}

impl RecordingExtractor {
    pub fn new() -> Self {
        RecordingExtractor::default()
    }

    /// Create `dir` inside the destination on every extraction.
    pub fn creating(mut self, dir: impl Into<String>) -> Self {
        self.creates.push(dir.into());
        self
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.borrow().clone()
    }
}

impl Extractor for RecordingExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ExtractError> {
        self.calls
            .borrow_mut()
            .push((archive.to_path_buf(), dest.to_path_buf()));

        for dir in std::iter::once(".").chain(self.creates.iter().map(String::as_str)) {
            let path = dest.join(dir);
            std::fs::create_dir_all(&path).map_err(|source| ExtractError::Io { path, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_runner_scripts_responses() {
        let runner = RecordingRunner::new().fail("make", 2).fail_to_spawn("gmake");
        let ok = runner.run(&CommandSpec::new("./configure", "/tmp")).unwrap();
        assert!(ok.success());

        let failed = runner.run(&CommandSpec::new("make install", "/tmp")).unwrap();
        assert_eq!(failed.code, Some(2));

        assert!(runner.run(&CommandSpec::new("gmake", "/tmp")).is_err());
        assert_eq!(runner.commands(), vec!["./configure", "make install", "gmake"]);
    }

    #[test]
    fn test_command_pattern() {
        assert!(CommandPattern::Exact("make".into()).matches("make"));
        assert!(!CommandPattern::Exact("make".into()).matches("make install"));
        assert!(CommandPattern::Contains("install".into()).matches("make install"));
    }
}
