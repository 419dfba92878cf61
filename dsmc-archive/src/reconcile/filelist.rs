//! File lists handed to `dsmc archive -filelist=`.

use super::ReuploadSet;
use crate::Result;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write `files` to a new, uniquely named file in `dir`, one double-quoted
/// path per line.
pub fn write_filelist(dir: &Path, correlation_id: &str, files: &ReuploadSet) -> Result<PathBuf> {
    let safe_id: String = correlation_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let path = dir.join(format!("reupload_{}_{}.filelist", safe_id, uuid::Uuid::new_v4()));

    let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
    let mut writer = BufWriter::new(file);
    for file in files.iter() {
        writeln!(writer, "\"{}\"", file)?;
    }
    writer.flush()?;

    tracing::debug!("Wrote {} paths to {}", files.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filelists_are_unique() -> Result<()> {
        let dir = TempDir::new()?;
        let files = ReuploadSet::from(vec!["/archive/run1/a".to_string()]);

        let first = write_filelist(dir.path(), "req/1", &files)?;
        let second = write_filelist(dir.path(), "req/1", &files)?;

        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(dir.path()));
        assert!(first
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("reupload_req_1_")));
        Ok(())
    }

    #[test]
    fn test_missing_directory_fails() {
        let files = ReuploadSet::from(vec!["/archive/run1/a".to_string()]);
        assert!(write_filelist(Path::new("/nonexistent/scratch"), "x", &files).is_err());
    }
}
