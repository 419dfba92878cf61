//! Directory traversal for inventories.
//!
//! Files are reported with their absolute path and the size dsmc would see:
//! symlinks are resolved to their target's size.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Also report directories (the root itself is never reported)
    pub include_dirs: bool,
}

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Is this a directory?
    pub is_dir: bool,

    /// Is this a symlink?
    pub is_symlink: bool,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// For symlinks, resolves to the target to get the real file size.
    /// Returns None if the symlink target is a directory or cannot be resolved.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let is_symlink = entry.path_is_symlink();

        let (size, is_dir) = if is_symlink {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_dir() => return Ok(None),
                Ok(resolved) => (resolved.len(), false),
                // Broken symlink
                Err(_) => return Ok(None),
            }
        } else {
            let metadata = entry.metadata()?;
            if !metadata.is_file() && !metadata.is_dir() {
                // Sockets, fifos and devices are never archived
                return Ok(None);
            }
            (metadata.len(), metadata.is_dir())
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
            is_dir,
            is_symlink,
        }))
    }
}

/// Walk a directory tree and collect all files, sorted by path
///
/// # Example
/// ```no_run
/// use dsmc_archive::fs::walker::{walk_directory, WalkOptions};
/// use std::path::Path;
///
/// let files = walk_directory(Path::new("/data/archives/run1"), WalkOptions::default()).unwrap();
/// println!("Found {} files", files.len());
/// ```
pub fn walk_directory(root: &Path, options: WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;

        if entry.file_type().is_dir() && !options.include_dirs {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            files.push(file_info);
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| !f.is_dir && f.path.starts_with(temp_dir.path())));

        Ok(())
    }

    #[test]
    fn test_include_dirs() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("Thumbnail_Images"))?;
        fs::write(temp_dir.path().join("Thumbnail_Images/a.jpg"), b"x")?;
        fs::write(temp_dir.path().join("keep.txt"), b"keep")?;

        let options = WalkOptions { include_dirs: true };
        let entries = walk_directory(temp_dir.path(), options)?;
        let relative: Vec<_> = entries.iter().map(|e| e.relative_path.clone()).collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("Thumbnail_Images"),
                PathBuf::from("Thumbnail_Images/a.jpg"),
                PathBuf::from("keep.txt"),
            ]
        );
        assert!(entries[0].is_dir);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_broken_symlink_skipped() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        std::os::unix::fs::symlink(
            temp_dir.path().join("missing"),
            temp_dir.path().join("dangling"),
        )?;

        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert!(files.is_empty());

        Ok(())
    }
}
