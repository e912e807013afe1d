//! Component sources.
//!
//! Sources are fetched (downloaded and verified, or read from a local
//! path) and then unpacked into the component's source directory.

pub mod extract;
pub mod fetch;

pub use extract::{ArchiveExtractor, ArchiveKind, ExtractError, Extractor};
pub use fetch::{FetchContext, FetchError, Fetcher, HttpFetcher};
