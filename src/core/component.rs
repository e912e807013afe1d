//! Components: named, versioned units of build work.
//!
//! A component is pure data. Platform-specific variation is expressed as
//! a condition attached to each step, never by mutating a shared registry.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::platform::PlatformCondition;
use crate::util::hash::{md5_bytes, sha256_bytes};

/// Expected digest of a downloaded source artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checksum {
    Md5(String),
    Sha256(String),
}

impl Checksum {
    /// Algorithm name for display.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Checksum::Md5(_) => "md5",
            Checksum::Sha256(_) => "sha256",
        }
    }

    /// Expected hex digest.
    pub fn value(&self) -> &str {
        match self {
            Checksum::Md5(v) | Checksum::Sha256(v) => v,
        }
    }

    /// Compute the digest of `data` with this checksum's algorithm.
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            Checksum::Md5(_) => md5_bytes(data),
            Checksum::Sha256(_) => sha256_bytes(data),
        }
    }

    /// Check `data` against the expected digest.
    ///
    /// Returns the actual digest on mismatch.
    pub fn verify(&self, data: &[u8]) -> Result<(), String> {
        let actual = self.digest(data);
        if actual.eq_ignore_ascii_case(self.value()) {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm(), self.value())
    }
}

/// Where a component's source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDescriptor {
    /// A downloadable artifact verified by checksum.
    Url {
        url: String,
        checksum: Option<Checksum>,
        /// File name to store the download under (defaults to the URL's last segment)
        target_filename: Option<String>,
        /// Whether the artifact is an archive to unpack
        extract: bool,
    },

    /// A local directory, relative to the recipe directory.
    Path { path: PathBuf },
}

impl SourceDescriptor {
    /// Create a URL source with a checksum.
    pub fn url(url: impl Into<String>, checksum: Option<Checksum>) -> Self {
        SourceDescriptor::Url {
            url: url.into(),
            checksum,
            target_filename: None,
            extract: true,
        }
    }

    /// Create a local path source.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        SourceDescriptor::Path { path: path.into() }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Url { url, .. } => write!(f, "{}", url),
            SourceDescriptor::Path { path } => write!(f, "path+{}", path.display()),
        }
    }
}

/// The action a build step performs.
///
/// Path-like fields may contain `{{ var }}` placeholders that are expanded
/// just before the step runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// A shell command line.
    Command {
        command: String,
        env: BTreeMap<String, String>,
        /// Working directory relative to the component's source directory
        cwd: Option<String>,
    },

    /// `make -j <workers> <args>`.
    Make {
        args: Vec<String>,
        env: BTreeMap<String, String>,
    },

    Mkdir { path: String },

    /// Copy files matching a glob (relative to the source directory) to `dest`.
    Copy { source: String, dest: String },

    /// Delete files or directories matching a glob.
    Delete { path: String },

    Touch { path: String },

    /// Render a template file from the source directory into `dest`.
    Template {
        source: String,
        dest: String,
        vars: BTreeMap<String, String>,
        mode: Option<u32>,
    },

    Chmod { path: String, mode: u32 },
}

impl StepKind {
    /// Short name of the step kind.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Command { .. } => "command",
            StepKind::Make { .. } => "make",
            StepKind::Mkdir { .. } => "mkdir",
            StepKind::Copy { .. } => "copy",
            StepKind::Delete { .. } => "delete",
            StepKind::Touch { .. } => "touch",
            StepKind::Template { .. } => "template",
            StepKind::Chmod { .. } => "chmod",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Command { command, .. } => write!(f, "{}", command),
            StepKind::Make { args, .. } => {
                write!(f, "make")?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            StepKind::Mkdir { path } => write!(f, "mkdir {}", path),
            StepKind::Copy { source, dest } => write!(f, "copy {} -> {}", source, dest),
            StepKind::Delete { path } => write!(f, "delete {}", path),
            StepKind::Touch { path } => write!(f, "touch {}", path),
            StepKind::Template { source, dest, .. } => {
                write!(f, "template {} -> {}", source, dest)
            }
            StepKind::Chmod { path, mode } => write!(f, "chmod {:o} {}", mode, path),
        }
    }
}

/// A build step guarded by a platform condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    pub condition: PlatformCondition,
}

impl Step {
    /// Create an unconditional step.
    pub fn new(kind: StepKind) -> Self {
        Step {
            kind,
            condition: PlatformCondition::always(),
        }
    }

    /// Create an unconditional shell command step.
    pub fn command(command: impl Into<String>) -> Self {
        Step::new(StepKind::Command {
            command: command.into(),
            env: BTreeMap::new(),
            cwd: None,
        })
    }

    /// Guard this step with a platform condition.
    pub fn when(mut self, condition: PlatformCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Add an environment variable to a command or make step.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match self.kind {
            StepKind::Command { ref mut env, .. } | StepKind::Make { ref mut env, .. } => {
                env.insert(key.into(), value.into());
            }
            _ => {}
        }
        self
    }
}

/// A named, versioned unit of build work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub version: String,

    /// Names of components that must be built first, in declared order.
    pub dependencies: Vec<String>,

    /// Steps, run in declared order.
    pub steps: Vec<Step>,

    pub source: Option<SourceDescriptor>,

    /// Subdirectory of the unpacked source to build in
    pub relative_path: Option<String>,

    pub description: Option<String>,
    pub license: Option<String>,
}

impl Component {
    /// Create a component with no dependencies, steps or source.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Component {
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
            steps: Vec::new(),
            source: None,
            relative_path: None,
            description: None,
            license: None,
        }
    }

    /// Add a dependency. Duplicates are ignored.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    /// Append a build step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the source descriptor.
    pub fn with_source(mut self, source: SourceDescriptor) -> Self {
        self.source = Some(source);
        self
    }

    /// Display identifier, e.g. `zlib v1.2.11`.
    pub fn id(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }
}
