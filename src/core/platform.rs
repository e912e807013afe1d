//! Target platform description and the predicates that guard steps
//! and dependencies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The platform a bundle is being assembled for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPlatform {
    /// Operating system: "linux", "macos", "windows", ...
    pub os: String,

    /// CPU architecture: "x86_64", "aarch64", ...
    pub arch: String,

    /// Distribution family: "debian", "redhat", "suse", ...
    pub family: Option<String>,

    /// Python runtimes bundled with the agent (e.g. "2", "3")
    pub python_runtimes: Vec<String>,
}

impl TargetPlatform {
    /// Describe the host platform.
    pub fn host() -> Self {
        TargetPlatform {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            family: None,
            python_runtimes: Vec::new(),
        }
    }

    /// Create a platform for an explicit OS/architecture pair.
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        TargetPlatform {
            os: os.into(),
            arch: arch.into(),
            family: None,
            python_runtimes: Vec::new(),
        }
    }

    /// Set the distribution family.
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    /// Add a bundled Python runtime.
    pub fn with_python_runtime(mut self, runtime: impl Into<String>) -> Self {
        let runtime = runtime.into();
        if !self.python_runtimes.contains(&runtime) {
            self.python_runtimes.push(runtime);
        }
        self
    }

    /// Whether the given Python runtime is bundled.
    pub fn has_python_runtime(&self, runtime: &str) -> bool {
        self.python_runtimes.iter().any(|r| r == runtime)
    }
}

impl Default for TargetPlatform {
    fn default() -> Self {
        TargetPlatform::host()
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch, self.os)?;
        if let Some(ref family) = self.family {
            write!(f, " ({})", family)?;
        }
        Ok(())
    }
}

/// Predicate over a [`TargetPlatform`].
///
/// Every field that is set must match; an empty condition always matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformCondition {
    /// Operating system: "linux", "macos", "windows"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// Negated OS match ("anything but windows")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_os: Option<String>,

    /// CPU architecture: "x86_64", "aarch64"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,

    /// Any of these distribution families
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub family: Vec<String>,

    /// Python runtime that must be bundled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python_runtime: Option<String>,
}

impl PlatformCondition {
    /// A condition that always holds.
    pub fn always() -> Self {
        PlatformCondition::default()
    }

    /// A condition on the operating system only.
    pub fn os(os: impl Into<String>) -> Self {
        PlatformCondition {
            os: Some(os.into()),
            ..Default::default()
        }
    }

    /// Whether this condition has no constraints.
    pub fn is_always(&self) -> bool {
        self == &PlatformCondition::default()
    }

    /// Check if this condition matches the target platform.
    pub fn matches(&self, target: &TargetPlatform) -> bool {
        if let Some(ref os) = self.os {
            if os != &target.os {
                return false;
            }
        }
        if let Some(ref not_os) = self.not_os {
            if not_os == &target.os {
                return false;
            }
        }
        if let Some(ref arch) = self.arch {
            if arch != &target.arch {
                return false;
            }
        }
        if !self.family.is_empty() {
            match target.family {
                Some(ref family) if self.family.iter().any(|f| f == family) => {}
                _ => return false,
            }
        }
        if let Some(ref runtime) = self.python_runtime {
            if !target.has_python_runtime(runtime) {
                return false;
            }
        }
        true
    }
}
