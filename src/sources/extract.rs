//! Archive extraction.
//!
//! Archives are unpacked as-is: the top-level directory of a tarball is
//! kept and recipes point at it through `relative_path`.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;

use crate::util::fs::join_within;

/// Error unpacking a source artifact.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum ExtractError {
    #[error("unsupported archive format: {}", path.display())]
    #[diagnostic(
        code(omnibuild::extract::unsupported),
        help("repack the source as .tar.gz, .tar or .zip, or set `extract = false`")
    )]
    Unsupported { path: PathBuf },

    #[error("archive entry `{entry}` escapes the destination directory")]
    #[diagnostic(code(omnibuild::extract::escapes_destination))]
    EscapesDestination { entry: String },

    #[error("corrupt archive {}: {message}", path.display())]
    #[diagnostic(code(omnibuild::extract::corrupt))]
    Corrupt { path: PathBuf, message: String },

    #[error("I/O error at {}: {source}", path.display())]
    #[diagnostic(code(omnibuild::extract::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Unpacks a fetched artifact into a directory.
pub trait Extractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ExtractError>;
}

/// Archive kinds recognised by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Tar,
    Zip,
    SevenZip,
    /// Not an archive; copied into the destination unchanged
    Plain,
}

impl ArchiveKind {
    pub fn detect(path: &Path) -> ArchiveKind {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else if name.ends_with(".tar") {
            ArchiveKind::Tar
        } else if name.ends_with(".zip") {
            ArchiveKind::Zip
        } else if name.ends_with(".7z") {
            ArchiveKind::SevenZip
        } else {
            ArchiveKind::Plain
        }
    }
}

/// Production extractor for tar, tar.gz and zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        ArchiveExtractor
    }
}

impl Extractor for ArchiveExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ExtractError> {
        fs::create_dir_all(dest).map_err(|e| ExtractError::io(dest, e))?;

        let kind = ArchiveKind::detect(archive);
        tracing::debug!("Extracting {} ({:?}) into {}", archive.display(), kind, dest.display());

        match kind {
            ArchiveKind::TarGz => {
                let file = File::open(archive).map_err(|e| ExtractError::io(archive, e))?;
                unpack_tar(archive, GzDecoder::new(BufReader::new(file)), dest)
            }
            ArchiveKind::Tar => {
                let file = File::open(archive).map_err(|e| ExtractError::io(archive, e))?;
                unpack_tar(archive, BufReader::new(file), dest)
            }
            ArchiveKind::Zip => unpack_zip(archive, dest),
            ArchiveKind::SevenZip => Err(ExtractError::Unsupported {
                path: archive.to_path_buf(),
            }),
            ArchiveKind::Plain => {
                let name = archive.file_name().ok_or_else(|| ExtractError::Unsupported {
                    path: archive.to_path_buf(),
                })?;
                let target = dest.join(name);
                fs::copy(archive, &target).map_err(|e| ExtractError::io(&target, e))?;
                Ok(())
            }
        }
    }
}

/// Join an archive entry path onto `dest`, refusing anything that would
/// land outside it.
fn entry_destination(dest: &Path, entry: &Path) -> Result<PathBuf, ExtractError> {
    join_within(dest, entry).ok_or_else(|| ExtractError::EscapesDestination {
        entry: entry.display().to_string(),
    })
}

/// Check that the deepest existing ancestor of `path` resolves inside `root`.
///
/// Catches symlinks unpacked by earlier entries that point elsewhere.
fn ensure_inside(root: &Path, path: &Path, entry: &Path) -> Result<(), ExtractError> {
    let Some(existing) = path.parent().and_then(|p| p.ancestors().find(|dir| dir.exists())) else {
        return Ok(());
    };
    let resolved = existing
        .canonicalize()
        .map_err(|e| ExtractError::io(existing, e))?;
    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(ExtractError::EscapesDestination {
            entry: entry.display().to_string(),
        })
    }
}

fn unpack_tar<R: Read>(archive_path: &Path, reader: R, dest: &Path) -> Result<(), ExtractError> {
    let corrupt = |e: std::io::Error| ExtractError::Corrupt {
        path: archive_path.to_path_buf(),
        message: e.to_string(),
    };
    let root = dest.canonicalize().map_err(|e| ExtractError::io(dest, e))?;

    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let entry_path = entry.path().map_err(corrupt)?.into_owned();
        let output_path = entry_destination(dest, &entry_path)?;

        if output_path == dest {
            continue;
        }
        ensure_inside(&root, &output_path, &entry_path)?;

        match entry.header().entry_type() {
            tar::EntryType::Directory
            | tar::EntryType::Regular
            | tar::EntryType::Continuous
            | tar::EntryType::Link
            | tar::EntryType::Symlink => {
                // unpack_in re-checks the resolved parent and skips escapes
                let unpacked = entry
                    .unpack_in(dest)
                    .map_err(|e| ExtractError::io(&output_path, e))?;
                if !unpacked {
                    return Err(ExtractError::EscapesDestination {
                        entry: entry_path.display().to_string(),
                    });
                }
            }
            other => {
                tracing::debug!("Skipping {:?} entry {}", other, entry_path.display());
            }
        }
    }

    Ok(())
}

fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<(), ExtractError> {
    let corrupt = |e: zip::result::ZipError| ExtractError::Corrupt {
        path: archive_path.to_path_buf(),
        message: e.to_string(),
    };

    let file = File::open(archive_path).map_err(|e| ExtractError::io(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(corrupt)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(corrupt)?;
        let relative = file
            .enclosed_name()
            .ok_or_else(|| ExtractError::EscapesDestination {
                entry: file.name().to_string(),
            })?;
        let output_path = entry_destination(dest, &relative)?;

        if file.is_dir() {
            fs::create_dir_all(&output_path).map_err(|e| ExtractError::io(&output_path, e))?;
            continue;
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ExtractError::io(parent, e))?;
        }
        let mut outfile =
            File::create(&output_path).map_err(|e| ExtractError::io(&output_path, e))?;
        std::io::copy(&mut file, &mut outfile).map_err(|e| ExtractError::io(&output_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&output_path, fs::Permissions::from_mode(mode))
                    .map_err(|e| ExtractError::io(&output_path, e))?;
            }
        }
    }

    Ok(())
}
