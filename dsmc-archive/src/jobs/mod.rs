//! The job runner seam.
//!
//! Jobs are queued, scheduled and supervised by an external runner. This
//! module only describes what the core needs from it: submitting a command,
//! querying statuses, reading a finished job's exit record and cancelling.

pub mod outcome;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub use outcome::{JobOutcome, OutcomeClassifier};

pub type JobId = u64;

/// Status as reported by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawJobStatus {
    Completed,
    Failed,
    Pending,
    Running,
    Cancelled,
    NotFound,
}

/// A command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Shell command line
    pub command: String,

    /// Cores the job needs
    pub cores: usize,

    /// Working directory of the job
    pub work_dir: PathBuf,

    /// Where stdout is redirected
    pub stdout: PathBuf,

    /// Where stderr is redirected
    pub stderr: PathBuf,
}

/// How a finished job's process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    pub exit_code: i32,

    /// Captured combined output of the process
    pub output_log: PathBuf,
}

/// Job execution collaborator. Implementations own the job table and must be
/// safe to call from concurrent requests.
#[cfg_attr(test, mockall::automock)]
pub trait JobRunner: Send + Sync {
    /// Queue `request`, returning its id, or an error if it cannot be scheduled.
    fn submit(&self, request: JobRequest) -> anyhow::Result<JobId>;

    fn status(&self, job_id: JobId) -> RawJobStatus;

    fn status_all(&self) -> HashMap<JobId, RawJobStatus>;

    /// Exit code and output log of a job whose process has exited.
    fn exit_record(&self, job_id: JobId) -> Option<ExitRecord>;

    /// Stop a job, returning its id if it was known.
    fn cancel(&self, job_id: JobId) -> Option<JobId>;

    fn cancel_all(&self);
}
