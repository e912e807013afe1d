//! Build context: directories, environment and target platform shared by
//! every component of a run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::component::Component;
use crate::core::platform::TargetPlatform;

/// Settings shared by all components built in one run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Directory the bundle is installed into
    pub install_dir: PathBuf,

    /// Directory each component's source is unpacked under (`<root>/<name>`)
    pub source_root: PathBuf,

    /// Root of the build and download caches
    pub cache_dir: PathBuf,

    /// Environment passed explicitly to every step
    pub env: BTreeMap<String, String>,

    /// Platform step and dependency conditions are evaluated against
    pub platform: TargetPlatform,

    /// Parallelism passed to `make -j`
    pub workers: usize,
}

impl BuildContext {
    pub fn new(
        install_dir: impl Into<PathBuf>,
        source_root: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        BuildContext {
            install_dir: install_dir.into(),
            source_root: source_root.into(),
            cache_dir: cache_dir.into(),
            env: BTreeMap::new(),
            platform: TargetPlatform::host(),
            workers: default_workers(),
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_platform(mut self, platform: TargetPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Directory the component's source is unpacked into.
    pub fn source_dir(&self, component: &Component) -> PathBuf {
        self.source_root.join(&component.name)
    }

    /// Download cache directory.
    pub fn download_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    /// Build marker directory.
    pub fn builds_dir(&self) -> PathBuf {
        self.cache_dir.join("builds")
    }

    /// Template variables for a component whose steps run in `work_dir`.
    ///
    /// Context environment entries are visible as variables too; the
    /// built-in names take precedence over them.
    pub fn variables(&self, component: &Component, work_dir: &Path) -> BTreeMap<String, String> {
        let mut vars = self.env.clone();
        vars.insert("install_dir".into(), self.install_dir.display().to_string());
        vars.insert("source_dir".into(), work_dir.display().to_string());
        vars.insert("cache_dir".into(), self.cache_dir.display().to_string());
        vars.insert("name".into(), component.name.clone());
        vars.insert("version".into(), component.version.clone());
        vars.insert("workers".into(), self.workers.to_string());
        vars.insert("os".into(), self.platform.os.clone());
        vars.insert("arch".into(), self.platform.arch.clone());
        vars
    }
}

/// Available parallelism, falling back to 1.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
