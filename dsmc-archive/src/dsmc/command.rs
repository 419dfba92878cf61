//! Shell command lines submitted to the job runner.
//!
//! The job runner executes commands through a shell, so every interpolated
//! value is single-quoted.

use std::path::Path;

/// dsmc treats `path/` as "the directory and its contents".
pub fn directory_spec(path: &Path) -> String {
    let path = path.to_string_lossy();
    format!("{}/", path.trim_end_matches('/'))
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `dsmc archive <path>/ -subdir=yes -description=<description>`, logging to
/// `dsm_log` through the `DSM_LOG` environment variable.
pub fn archive_directory(
    binary: &Path,
    archive_path: &Path,
    description: &str,
    dsm_log: &Path,
) -> String {
    format!(
        "export DSM_LOG={} && {} archive {} -subdir=yes -description={}",
        shell_quote(&dsm_log.to_string_lossy()),
        shell_quote(&binary.to_string_lossy()),
        shell_quote(&directory_spec(archive_path)),
        shell_quote(description),
    )
}

/// `dsmc archive -filelist=<file> -description=<description>`
pub fn archive_filelist(binary: &Path, filelist: &Path, description: &str) -> String {
    format!(
        "{} archive -filelist={} -description={}",
        shell_quote(&binary.to_string_lossy()),
        shell_quote(&filelist.to_string_lossy()),
        shell_quote(description),
    )
}
