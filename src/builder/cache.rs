//! Content-addressed build cache.
//!
//! A component is rebuilt only when its cache key changes. The key covers
//! the component's name, version and a hash of everything that determines
//! its build: steps, source and relative path. Entries are created once on
//! success and never mutated; a changed definition simply misses.
//!
//! An entry also remembers the install dir and target platform it was built
//! for. It only counts as a hit when both match the current build, since
//! the same definition selects different steps on different platforms.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::component::Component;
use crate::core::platform::TargetPlatform;
use crate::util::fs::{ensure_dir, remove_path, write_atomic};
use crate::util::hash::Fingerprint;

/// Identifies one build of one component definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub name: String,
    pub version: String,
    /// Hash of steps, source and relative path
    pub hash: String,
}

impl CacheKey {
    /// Compute the key for a component definition.
    pub fn for_component(component: &Component) -> CacheKey {
        let mut fp = Fingerprint::new();
        fp.update_str(&component.name);
        fp.update_str(&component.version);
        for step in &component.steps {
            fp.update_str(&serde_json::to_string(step).unwrap_or_default());
        }
        let source = component
            .source
            .as_ref()
            .map(|s| serde_json::to_string(s).unwrap_or_default());
        fp.update_opt(source.as_deref());
        fp.update_opt(component.relative_path.as_deref());

        CacheKey {
            name: component.name.clone(),
            version: component.version.clone(),
            hash: fp.finish(),
        }
    }

    /// File the entry is persisted under.
    pub fn file_name(&self) -> String {
        format!("{}.json", self)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.version, &self.hash[..16.min(self.hash.len())])
    }
}

/// Record of a successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub success: bool,
    /// Directory the component installed into
    pub install_dir: PathBuf,
    /// Platform the steps were selected for
    #[serde(default)]
    pub platform: Option<TargetPlatform>,
    /// Seconds since the Unix epoch
    pub built_at: u64,
}

impl CacheEntry {
    pub fn new(key: CacheKey, install_dir: impl Into<PathBuf>) -> Self {
        let built_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        CacheEntry {
            key,
            success: true,
            install_dir: install_dir.into(),
            platform: None,
            built_at,
        }
    }

    /// Record the platform the build ran for.
    pub fn for_platform(mut self, platform: &TargetPlatform) -> Self {
        self.platform = Some(platform.clone());
        self
    }

    /// Whether this build can stand in for one into `install_dir` on `platform`.
    ///
    /// Entries without a platform never match.
    pub fn reusable_for(&self, install_dir: &Path, platform: &TargetPlatform) -> bool {
        self.success && self.install_dir == install_dir && self.platform.as_ref() == Some(platform)
    }
}

/// The build cache, optionally backed by a directory of JSON markers.
#[derive(Debug, Default)]
pub struct BuildCache {
    entries: HashMap<CacheKey, CacheEntry>,
    dir: Option<PathBuf>,
}

impl BuildCache {
    /// A cache that lives only as long as this value.
    pub fn in_memory() -> Self {
        BuildCache::default()
    }

    /// A cache persisted under `dir` (typically `<cache_dir>/builds`).
    pub fn persistent(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(BuildCache {
            entries: HashMap::new(),
            dir: Some(dir),
        })
    }

    /// Directory entries are persisted in, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Look up a key, consulting the persistent store on a memory miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<&CacheEntry> {
        if !self.entries.contains_key(key) {
            let entry = self.load(key)?;
            self.entries.insert(key.clone(), entry);
        }
        self.entries.get(key).filter(|e| e.success)
    }

    fn load(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.dir.as_ref()?.join(key.file_name());
        let contents = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CacheEntry>(&contents) {
            Ok(entry) if entry.key == *key => Some(entry),
            Ok(_) => {
                tracing::warn!("Ignoring cache entry {} with a foreign key", path.display());
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring corrupt cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Record a successful build.
    pub fn record(&mut self, entry: CacheEntry) -> Result<()> {
        if let Some(ref dir) = self.dir {
            let path = dir.join(entry.key.file_name());
            let json = serde_json::to_string_pretty(&entry)
                .context("failed to serialize cache entry")?;
            write_atomic(&path, json.as_bytes())?;
            tracing::debug!("Recorded cache entry {}", path.display());
        }
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Whether the key is present (without loading it into memory).
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
            || self
                .dir
                .as_ref()
                .is_some_and(|dir| dir.join(key.file_name()).is_file())
    }

    /// Remove every entry. Returns the number of persisted entries removed.
    pub fn clear(&mut self) -> Result<usize> {
        self.entries.clear();

        let Some(ref dir) = self.dir else {
            return Ok(0);
        };
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read cache directory: {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                remove_path(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of entries loaded in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
