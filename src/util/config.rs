//! Configuration file support for omnibuild.
//!
//! omnibuild reads two configuration files:
//! - Global: `~/.omnibuild/config.toml` - User-wide defaults
//! - Project: `.omnibuild/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::TargetPlatform;

/// omnibuild configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Target platform overrides
    pub platform: PlatformConfig,

    /// Network settings
    pub net: NetConfig,

    /// Environment passed explicitly to every build step
    pub env: BTreeMap<String, String>,

    /// Per-component version overrides (name -> version)
    pub versions: BTreeMap<String, String>,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Parallelism passed to `make -j` (None = available cores)
    pub jobs: Option<usize>,

    /// Directory the bundle is installed into
    pub install_dir: Option<PathBuf>,

    /// Directory holding `*.toml` recipes
    pub recipes_dir: Option<PathBuf>,

    /// Directory sources are unpacked into
    pub source_dir: Option<PathBuf>,
}

/// Cache-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of the build marker and download cache
    pub dir: Option<PathBuf>,
}

/// Target platform overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub os: Option<String>,
    pub arch: Option<String>,
    pub family: Option<String>,
    pub python_runtimes: Vec<String>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Download timeout in seconds
    pub timeout: Option<u64>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.install_dir.is_some() {
            self.build.install_dir = other.build.install_dir;
        }
        if other.build.recipes_dir.is_some() {
            self.build.recipes_dir = other.build.recipes_dir;
        }
        if other.build.source_dir.is_some() {
            self.build.source_dir = other.build.source_dir;
        }

        if other.cache.dir.is_some() {
            self.cache.dir = other.cache.dir;
        }

        if other.platform.os.is_some() {
            self.platform.os = other.platform.os;
        }
        if other.platform.arch.is_some() {
            self.platform.arch = other.platform.arch;
        }
        if other.platform.family.is_some() {
            self.platform.family = other.platform.family;
        }
        if !other.platform.python_runtimes.is_empty() {
            self.platform.python_runtimes = other.platform.python_runtimes;
        }

        if other.net.timeout.is_some() {
            self.net.timeout = other.net.timeout;
        }

        // Tables merge key by key
        self.env.extend(other.env);
        self.versions.extend(other.versions);
    }

    /// The target platform: host defaults with configured overrides applied.
    pub fn target_platform(&self) -> TargetPlatform {
        let mut platform = TargetPlatform::host();
        if let Some(ref os) = self.platform.os {
            platform.os = os.clone();
        }
        if let Some(ref arch) = self.platform.arch {
            platform.arch = arch.clone();
        }
        if self.platform.family.is_some() {
            platform.family = self.platform.family.clone();
        }
        for runtime in &self.platform.python_runtimes {
            platform = platform.with_python_runtime(runtime.clone());
        }
        platform
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.omnibuild/config.toml)
/// 2. Global config (~/.omnibuild/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}
