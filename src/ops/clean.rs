//! Implementation of `omnibuild clean`.

use std::path::PathBuf;

use anyhow::Result;

use crate::builder::BuildCache;
use crate::util::fs::{dir_size, remove_path};

/// What to remove.
#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub cache_dir: PathBuf,
    /// Also remove downloaded source artifacts
    pub downloads: bool,
    /// Also remove unpacked sources in this directory
    pub source_dir: Option<PathBuf>,
}

/// What was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanResult {
    /// Cache entries removed
    pub entries: usize,
    /// Bytes of downloads removed
    pub download_bytes: u64,
    /// Bytes of unpacked sources removed
    pub source_bytes: u64,
}

/// Forget every recorded build, and optionally downloads and sources.
///
/// Install directories are never touched.
pub fn clean(opts: &CleanOptions) -> Result<CleanResult> {
    let mut result = CleanResult::default();

    let mut cache = BuildCache::persistent(opts.cache_dir.join("builds"))?;
    result.entries = cache.clear()?;
    tracing::debug!("Removed {} cache entries", result.entries);

    if opts.downloads {
        let downloads = opts.cache_dir.join("downloads");
        result.download_bytes = dir_size(&downloads);
        remove_path(&downloads)?;
    }

    if let Some(ref source_dir) = opts.source_dir {
        result.source_bytes = dir_size(source_dir);
        remove_path(source_dir)?;
    }

    Ok(result)
}
