//! Archive tree materialization.
//!
//! An archive tree mirrors a runfolder with symbolic links: every kept file is
//! a link to the original, excluded directories and extensions are left out.
//! It is the unit handed to dsmc for upload.

use crate::{DsmcError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Names left out of an archive tree.
#[derive(Debug, Clone, Default)]
pub struct TreeFilter {
    exclude_dirs: HashSet<String>,
    exclude_extensions: HashSet<String>,
}

impl TreeFilter {
    /// `exclude_extensions` may be given with or without the leading dot.
    pub fn new<D, E>(exclude_dirs: D, exclude_extensions: E) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            exclude_dirs: exclude_dirs.into_iter().map(Into::into).collect(),
            exclude_extensions: exclude_extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_string())
                .collect(),
        }
    }

    fn excludes_dir(&self, name: &str) -> bool {
        self.exclude_dirs.contains(name)
    }

    fn excludes_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.exclude_extensions.contains(ext))
    }
}

/// What a tree build produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    pub destination: PathBuf,
    pub directories: usize,
    pub links: usize,
    pub skipped: usize,
}

/// Make sure `dest` can be created.
///
/// An existing destination is refused unless `remove` is set, in which case
/// it is deleted first. Links inside it are removed, not followed.
pub fn verify_destination(dest: &Path, remove: bool) -> Result<()> {
    if fs::symlink_metadata(dest).is_err() {
        return Ok(());
    }

    if !remove {
        return Err(DsmcError::DestinationExists(dest.to_path_buf()));
    }

    info!("Removing existing archive tree {}", dest.display());
    let removed = if fs::symlink_metadata(dest)?.is_dir() {
        fs::remove_dir_all(dest)
    } else {
        fs::remove_file(dest)
    };
    removed.map_err(|e| DsmcError::archive_build(dest, e))
}

/// Mirror `source` into `dest` as symbolic links.
///
/// Directories named in the filter are skipped with their whole subtree;
/// regular files with an excluded extension are skipped; anything that is not
/// a directory or regular file (sockets, existing symlinks) is skipped. The
/// first I/O failure aborts the build.
pub fn build_tree(source: &Path, dest: &Path, filter: &TreeFilter) -> Result<TreeSummary> {
    let source = fs::canonicalize(source).map_err(|e| DsmcError::archive_build(source, e))?;
    let mut summary = TreeSummary {
        destination: dest.to_path_buf(),
        ..TreeSummary::default()
    };

    let walker = WalkDir::new(&source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !filter.excludes_dir(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source.clone());
            DsmcError::archive_build(path, e.into())
        })?;

        let relative = entry.path().strip_prefix(&source).unwrap_or(entry.path());
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| DsmcError::archive_build(&target, e))?;
            summary.directories += 1;
        } else if file_type.is_file() && !filter.excludes_file(entry.path()) {
            std::os::unix::fs::symlink(entry.path(), &target)
                .map_err(|e| DsmcError::archive_build(&target, e))?;
            summary.links += 1;
        } else {
            debug!("Skipping {}", entry.path().display());
            summary.skipped += 1;
        }
    }

    info!(
        "Built archive tree {} from {}: {} directories, {} links, {} skipped",
        dest.display(),
        source.display(),
        summary.directories,
        summary.links,
        summary.skipped
    );

    Ok(summary)
}

/// [`verify_destination`] followed by [`build_tree`].
pub fn create_archive_tree(
    source: &Path,
    dest: &Path,
    filter: &TreeFilter,
    remove: bool,
) -> Result<TreeSummary> {
    if !source.is_dir() {
        return Err(DsmcError::NotFound(format!(
            "source directory {} does not exist",
            source.display()
        )));
    }
    verify_destination(dest, remove)?;
    build_tree(source, dest, filter)
}
