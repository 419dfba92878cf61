//! Error taxonomy for archive operations.
//!
//! Every failure the core can report has its own variant so that callers
//! (the REST layer, the CLI) can map them to distinct responses.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DsmcError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job submission failed: {0}")]
    Submission(String),

    #[error("Remote command `{command}` failed with exit code {code:?}: {stderr}")]
    RemoteCommand {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Invalid inventory line {line:?}: {reason}")]
    Validation { line: String, reason: String },

    #[error("Destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("Archive build failed at {}: {source}", path.display())]
    ArchiveBuild {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compression failed for {}: {source}", path.display())]
    Compression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read job output log {}: {source}", path.display())]
    Classification {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DsmcError {
    pub(crate) fn validation(line: &str, reason: impl Into<String>) -> Self {
        DsmcError::Validation {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn archive_build(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DsmcError::ArchiveBuild {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DsmcError>;
