//! Subprocess execution.
//!
//! Build steps never inherit the ambient process environment: every
//! command carries an explicit environment map and working directory.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};

/// A command line to run through the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        CommandSpec {
            command: command.into(),
            env: BTreeMap::new(),
            cwd: cwd.into(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (`None` if killed by a signal)
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr, for error reports.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let stderr = self.stderr.trim_end();
        if !stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(stderr);
        }
        out
    }
}

impl From<Output> for ProcessOutput {
    fn from(output: Output) -> Self {
        ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs external commands. Blocks until the process exits.
///
/// A non-zero exit is reported through [`ProcessOutput::code`]; `Err` is
/// reserved for failing to start or wait for the process.
pub trait ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput>;
}

/// Runs command lines through the platform shell with a cleared environment.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
    flag: &'static str,
}

impl ShellRunner {
    /// Locate the platform shell.
    pub fn new() -> Self {
        if cfg!(windows) {
            ShellRunner {
                shell: find_executable("cmd").unwrap_or_else(|| PathBuf::from("cmd")),
                flag: "/C",
            }
        } else {
            ShellRunner {
                shell: find_executable("sh").unwrap_or_else(|| PathBuf::from("/bin/sh")),
                flag: "-c",
            }
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        ShellRunner::new()
    }
}

impl ProcessRunner for ShellRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        tracing::debug!("running `{}` in {}", spec.command, spec.cwd.display());

        let mut pb = ProcessBuilder::new(&self.shell)
            .arg(self.flag)
            .arg(&spec.command)
            .env_clear()
            .cwd(&spec.cwd);
        for (key, value) in &spec.env {
            pb = pb.env(key, value);
        }

        Ok(pb.exec()?.into())
    }
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    env_clear: bool,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            env_clear: false,
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Start from an empty environment instead of inheriting ours.
    pub fn env_clear(mut self) -> Self {
        self.env_clear = true;
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if self.env_clear {
            cmd.env_clear();
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command and wait for completion.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.display_command()))?;

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for `{}`", self.program.display()))?;

        Ok(output)
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Name of the make program to use on this host.
///
/// BSDs ship GNU make as `gmake`.
pub fn make_program() -> String {
    if cfg!(any(target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))
        && find_executable("gmake").is_some()
    {
        "gmake".to_string()
    } else {
        "make".to_string()
    }
}
