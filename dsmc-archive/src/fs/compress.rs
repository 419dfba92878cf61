//! Packing an archive tree into a single compressed file.
//!
//! The tree is written as a zstd-compressed tar stream next to the entries it
//! leaves out (passthrough files such as the sample sheet stay readable
//! without unpacking). Files that went into the archive are then removed from
//! the tree.

use super::walker::{walk_directory, FileInfo, WalkOptions};
use crate::{DsmcError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

pub const ARCHIVE_EXTENSION: &str = "tar.zst";

/// What a compression run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionSummary {
    pub archive_file: PathBuf,
    pub files: usize,
    pub bytes: u64,
    pub passthrough: Vec<PathBuf>,
}

/// Location of the compressed archive for the tree at `archive_path`.
pub fn archive_file_for(archive_path: &Path) -> Result<PathBuf> {
    let name = archive_path.file_name().ok_or_else(|| {
        DsmcError::InvalidRequest(format!("{} has no name", archive_path.display()))
    })?;
    Ok(archive_path.join(format!("{}.{}", name.to_string_lossy(), ARCHIVE_EXTENSION)))
}

fn is_passthrough(relative: &Path, passthrough: &HashSet<&str>) -> bool {
    let top_level = match relative.components().next() {
        Some(Component::Normal(name)) => name.to_str(),
        _ => None,
    };
    let base = relative.file_name().and_then(|n| n.to_str());

    [top_level, base]
        .into_iter()
        .flatten()
        .any(|name| passthrough.contains(name))
}

/// Compress everything under `archive_path` except passthrough entries into
/// `<archive_path>/<name>.tar.zst`, then remove the archived files.
///
/// An existing archive file is never overwritten. Directories stay in place
/// even when emptied.
pub fn compress<S: AsRef<str>>(
    archive_path: &Path,
    passthrough_names: &[S],
    level: i32,
) -> Result<CompressionSummary> {
    let archive_file = archive_file_for(archive_path)?;
    let compression_error = |source: io::Error| DsmcError::Compression {
        path: archive_file.clone(),
        source,
    };

    let name = archive_path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_default();
    let passthrough: HashSet<&str> = passthrough_names.iter().map(AsRef::as_ref).collect();

    let entries = walk_directory(archive_path, WalkOptions { include_dirs: true })
        .map_err(compression_error)?;

    let (included, skipped): (Vec<FileInfo>, Vec<FileInfo>) = entries
        .into_iter()
        .filter(|entry| entry.path != archive_file)
        .partition(|entry| !is_passthrough(&entry.relative_path, &passthrough));

    let output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&archive_file)
        .map_err(compression_error)?;

    if let Err(e) = write_archive(output, &name, &included, level) {
        if let Err(cleanup) = fs::remove_file(&archive_file) {
            warn!("Could not remove partial archive {}: {}", archive_file.display(), cleanup);
        }
        return Err(compression_error(e));
    }

    let (files, bytes) = remove_archived(&included).map_err(|e| {
        warn!(
            "{} was written but {} is only partly cleaned up: {}",
            archive_file.display(),
            archive_path.display(),
            e
        );
        compression_error(e)
    })?;

    let passthrough: Vec<PathBuf> = skipped.into_iter().map(|e| e.relative_path).collect();

    info!(
        "Compressed {} files ({} bytes) from {} into {}, {} passthrough entries left",
        files,
        bytes,
        archive_path.display(),
        archive_file.display(),
        passthrough.len()
    );

    Ok(CompressionSummary {
        archive_file,
        files,
        bytes,
        passthrough,
    })
}

/// Remove the regular files of `entries`, returning their count and size.
///
/// A failure names how many files were already removed, since the archive
/// holds them all by then.
fn remove_archived(entries: &[FileInfo]) -> io::Result<(usize, u64)> {
    let total = entries.iter().filter(|e| !e.is_dir).count();
    let mut files = 0;
    let mut bytes = 0;

    for entry in entries.iter().filter(|e| !e.is_dir) {
        if let Err(e) = fs::remove_file(&entry.path) {
            return Err(io::Error::new(
                e.kind(),
                format!(
                    "removing {} failed after {} of {} archived files were removed: {}",
                    entry.path.display(),
                    files,
                    total,
                    e
                ),
            ));
        }
        files += 1;
        bytes += entry.size;
    }

    Ok((files, bytes))
}

/// Tar `entries` under `<name>/` and zstd-compress into `output`.
/// Symlinks are stored as the files they point to.
fn write_archive(output: File, name: &Path, entries: &[FileInfo], level: i32) -> io::Result<()> {
    let encoder = zstd::stream::write::Encoder::new(BufWriter::new(output), level)?;
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(true);

    for entry in entries {
        let stored = name.join(&entry.relative_path);
        if entry.is_dir {
            builder.append_dir(&stored, &entry.path)?;
        } else {
            builder.append_path_with_name(&entry.path, &stored)?;
        }
    }

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}
