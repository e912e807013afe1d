//! Global context for omnibuild operations.
//!
//! Provides centralized access to the working directory and the default
//! locations of configuration, caches and recipes.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};

/// Project directories for omnibuild
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("com", "omnibuild", "omnibuild"));

/// Global context containing paths and output preferences.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global omnibuild data (~/.omnibuild/)
    home: PathBuf,

    /// Default cache root
    cache_root: PathBuf,

    color: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        let home = BaseDirs::new()
            .map(|b| b.home_dir().join(".omnibuild"))
            .unwrap_or_else(|| PathBuf::from(".omnibuild"));

        let cache_root = PROJECT_DIRS
            .as_ref()
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| home.join("cache"));

        Ok(GlobalContext {
            cwd,
            home,
            cache_root,
            color: true,
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the omnibuild home directory (~/.omnibuild/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Default cache directory for build markers and downloads.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_root.clone()
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Get the project-local omnibuild directory.
    pub fn project_dir(&self) -> PathBuf {
        self.cwd.join(".omnibuild")
    }

    /// Get the project configuration file path.
    pub fn project_config_path(&self) -> PathBuf {
        self.project_dir().join("config.toml")
    }

    /// Default recipes directory.
    pub fn recipes_dir(&self) -> PathBuf {
        self.cwd.join("recipes")
    }

    /// Default install directory for the assembled bundle.
    pub fn install_dir(&self) -> PathBuf {
        self.project_dir().join("install")
    }

    /// Default directory sources are unpacked into.
    pub fn source_dir(&self) -> PathBuf {
        self.project_dir().join("src")
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Resolve a possibly relative path against the working directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_paths() {
        let ctx = GlobalContext::new().unwrap();
        assert!(ctx.cwd().is_absolute());
        assert!(ctx.home().to_string_lossy().contains("omnibuild"));
        assert!(ctx.config_path().ends_with("config.toml"));
    }

    #[test]
    fn test_project_paths_follow_cwd() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf()).unwrap();

        assert_eq!(ctx.recipes_dir(), tmp.path().join("recipes"));
        assert_eq!(
            ctx.project_config_path(),
            tmp.path().join(".omnibuild").join("config.toml")
        );
        assert_eq!(ctx.resolve_path(Path::new("out")), tmp.path().join("out"));
        assert_eq!(ctx.resolve_path(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
