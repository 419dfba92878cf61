//! Access to the remote store through the dsmc command-line client.

pub mod command;

use crate::{DsmcError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// An archive query: `dsmc q archive <path>/ [-subdir=yes] [-description=..]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveQuery {
    pub path: PathBuf,
    pub subdir: bool,
    pub description: Option<String>,
}

impl ArchiveQuery {
    /// Query listing every upload of `path` itself.
    pub fn uploads_of(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            subdir: false,
            description: None,
        }
    }

    /// Query listing every entry below `path` stored under `description`.
    pub fn contents_of(path: &Path, description: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            subdir: true,
            description: Some(description.to_string()),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "q".to_string(),
            "archive".to_string(),
            command::directory_spec(&self.path),
        ];
        if self.subdir {
            args.push("-subdir=yes".to_string());
        }
        if let Some(description) = &self.description {
            args.push(format!("-description={}", description));
        }
        args
    }
}

/// Read access to the remote archive store.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteStore: Send + Sync {
    /// Raw output lines of an archive query.
    fn query_archive(&self, query: &ArchiveQuery) -> Result<Vec<String>>;
}

/// Runs the dsmc binary directly, without a shell.
///
/// There is no timeout: a hung dsmc blocks the caller.
#[derive(Debug, Clone)]
pub struct DsmcClient {
    binary: PathBuf,
}

impl DsmcClient {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Warning dsmc prints, with exit code 8, when a query matches nothing.
pub const NO_MATCH_WARNING: &str = "ANS1092W";

const NO_MATCH_EXIT_CODE: i32 = 8;

/// Whether a failed query only reported that nothing matched.
fn is_empty_result(code: Option<i32>, stdout: &str, stderr: &str) -> bool {
    code == Some(NO_MATCH_EXIT_CODE)
        && (stdout.contains(NO_MATCH_WARNING) || stderr.contains(NO_MATCH_WARNING))
}

impl RemoteStore for DsmcClient {
    fn query_archive(&self, query: &ArchiveQuery) -> Result<Vec<String>> {
        let args = query.args();
        let command_line = format!("{} {}", self.binary.display(), args.join(" "));
        tracing::debug!("Running {}", command_line);

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| DsmcError::RemoteCommand {
                command: command_line.clone(),
                code: None,
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_empty_result(output.status.code(), &stdout, &stderr) {
                tracing::debug!("{} matched no archived files", command_line);
                return Ok(Vec::new());
            }

            tracing::warn!("{} exited with {:?}", command_line, output.status.code());
            return Err(DsmcError::RemoteCommand {
                command: command_line,
                code: output.status.code(),
                stderr,
            });
        }

        Ok(stdout.lines().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_args() {
        let query = ArchiveQuery::contents_of(Path::new("/archive/run1"), "abc-123");
        assert_eq!(
            query.args(),
            vec!["q", "archive", "/archive/run1/", "-subdir=yes", "-description=abc-123"]
        );

        let query = ArchiveQuery::uploads_of(Path::new("/archive/run1/"));
        assert_eq!(query.args(), vec!["q", "archive", "/archive/run1/"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_client_returns_stdout_lines() {
        // `echo` stands in for dsmc and prints its arguments back
        let client = DsmcClient::new("echo");
        let lines = client
            .query_archive(&ArchiveQuery::uploads_of(Path::new("/archive/run1")))
            .unwrap();
        assert_eq!(lines, vec!["q archive /archive/run1/"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_client_fails_fast_on_nonzero_exit() {
        let client = DsmcClient::new("false");
        let err = client
            .query_archive(&ArchiveQuery::uploads_of(Path::new("/archive/run1")))
            .unwrap_err();
        assert!(matches!(err, DsmcError::RemoteCommand { code: Some(1), .. }));
    }

    #[test]
    fn test_no_match_warning_is_empty_result() {
        let stdout = "ANS1092W No files matching search criteria were found";
        assert!(is_empty_result(Some(8), stdout, ""));
        assert!(is_empty_result(Some(8), "", stdout));
        assert!(!is_empty_result(Some(12), stdout, ""));
        assert!(!is_empty_result(Some(8), "ANS1809W Session lost", ""));
    }

    #[test]
    #[cfg(unix)]
    fn test_client_maps_no_match_exit_to_empty_listing() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("dsmc");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'ANS1092W No files matching search criteria were found'\nexit 8\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let lines = DsmcClient::new(&script)
            .query_archive(&ArchiveQuery::uploads_of(Path::new("/archive/run1")))
            .unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_client_missing_binary() {
        let client = DsmcClient::new("/nonexistent/dsmc");
        let err = client
            .query_archive(&ArchiveQuery::uploads_of(Path::new("/archive/run1")))
            .unwrap_err();
        assert!(matches!(err, DsmcError::RemoteCommand { code: None, .. }));
    }
}
