//! Source fetching.
//!
//! Downloads are verified against the recipe's checksum and kept in a
//! download cache keyed by that checksum, so a verified artifact is never
//! downloaded twice.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::core::component::{Checksum, SourceDescriptor};
use crate::util::fs::{is_plain_segment, write_atomic};
use crate::util::hash::sha256_str;

/// Error fetching a component's source.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum FetchError {
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    #[diagnostic(
        code(omnibuild::fetch::checksum_mismatch),
        help("the upstream artifact changed or the recipe checksum is wrong")
    )]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("failed to download {url}: {message}")]
    #[diagnostic(code(omnibuild::fetch::network))]
    Network { url: String, message: String },

    #[error("invalid source url `{url}`: {message}")]
    #[diagnostic(code(omnibuild::fetch::invalid_url))]
    InvalidUrl { url: String, message: String },

    #[error("I/O error at {}: {source}", path.display())]
    #[diagnostic(code(omnibuild::fetch::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where fetched artifacts are kept.
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Download cache directory (`<cache_dir>/downloads`)
    pub download_dir: PathBuf,
}

impl FetchContext {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        FetchContext {
            download_dir: download_dir.into(),
        }
    }
}

/// Retrieves a component's source and returns its local path.
///
/// For URL sources the returned path is the downloaded file; for path
/// sources it is the source directory itself.
pub trait Fetcher {
    fn fetch(&self, source: &SourceDescriptor, ctx: &FetchContext) -> Result<PathBuf, FetchError>;
}

/// Production fetcher: HTTP(S) via `reqwest`, `file://` and local paths.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new() -> Self {
        HttpFetcher {
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn download(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        tracing::info!("Downloading {}", url);

        let network = |message: String| FetchError::Network {
            url: url.to_string(),
            message,
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| network(e.to_string()))?;

        let response = client
            .get(url.clone())
            .send()
            .map_err(|e| network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(network(format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().map_err(|e| network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn fetch_url(
        &self,
        raw_url: &str,
        checksum: Option<&Checksum>,
        target_filename: Option<&str>,
        ctx: &FetchContext,
    ) -> Result<PathBuf, FetchError> {
        let url = Url::parse(raw_url).map_err(|e| FetchError::InvalidUrl {
            url: raw_url.to_string(),
            message: e.to_string(),
        })?;

        let filename = match target_filename {
            Some(name) => name.to_string(),
            None => file_name_from_url(&url).ok_or_else(|| FetchError::InvalidUrl {
                url: raw_url.to_string(),
                message: "no file name in url path".to_string(),
            })?,
        };

        // Verified downloads live under their checksum; unverified ones
        // under a hash of the url and are fetched again every time.
        let slot = match checksum {
            Some(c) => c.value().to_ascii_lowercase(),
            None => format!("unverified-{}", &sha256_str(raw_url)[..16]),
        };
        if !is_plain_segment(&slot) || !is_plain_segment(&filename) {
            return Err(FetchError::InvalidUrl {
                url: raw_url.to_string(),
                message: format!(
                    "download name `{}/{}` would leave the download directory",
                    slot, filename
                ),
            });
        }
        let dest = ctx.download_dir.join(slot).join(&filename);

        if let Some(checksum) = checksum {
            if dest.is_file() {
                let data = std::fs::read(&dest).map_err(|e| FetchError::io(&dest, e))?;
                if checksum.verify(&data).is_ok() {
                    tracing::debug!("Using cached download {}", dest.display());
                    return Ok(dest);
                }
                tracing::warn!("Cached download {} is corrupt, fetching again", dest.display());
            }
        }

        let data = match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| FetchError::InvalidUrl {
                    url: raw_url.to_string(),
                    message: "not a local file path".to_string(),
                })?;
                std::fs::read(&path).map_err(|e| FetchError::io(&path, e))?
            }
            "http" | "https" => self.download(&url)?,
            other => {
                return Err(FetchError::InvalidUrl {
                    url: raw_url.to_string(),
                    message: format!("unsupported scheme `{}`", other),
                })
            }
        };

        match checksum {
            Some(checksum) => {
                checksum
                    .verify(&data)
                    .map_err(|actual| FetchError::ChecksumMismatch {
                        url: raw_url.to_string(),
                        expected: checksum.value().to_string(),
                        actual,
                    })?;
                tracing::debug!("{} verified", checksum);
            }
            None => tracing::warn!("No checksum for {}, skipping verification", raw_url),
        }

        write_atomic(&dest, &data).map_err(|e| FetchError::Io {
            path: dest.clone(),
            source: std::io::Error::other(format!("{:#}", e)),
        })?;

        Ok(dest)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        HttpFetcher::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, source: &SourceDescriptor, ctx: &FetchContext) -> Result<PathBuf, FetchError> {
        match source {
            SourceDescriptor::Url {
                url,
                checksum,
                target_filename,
                ..
            } => self.fetch_url(url, checksum.as_ref(), target_filename.as_deref(), ctx),
            SourceDescriptor::Path { path } => {
                if path.is_dir() {
                    Ok(path.clone())
                } else {
                    Err(FetchError::io(
                        path,
                        std::io::Error::new(std::io::ErrorKind::NotFound, "source directory not found"),
                    ))
                }
            }
        }
    }
}

/// Last non-empty path segment of a URL.
fn file_name_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| s.to_string())
}
