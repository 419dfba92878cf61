//! Interpretation of finished dsmc jobs.
//!
//! dsmc exits with 8 when it completed with warnings. Some warnings are
//! routine (ANS1809W: session re-established) and should not fail a job, so a
//! failed job with exit code 8 is re-examined: its output log is scanned for
//! `ANS<digits>W` codes and the job counts as done when all of them are
//! whitelisted.

use super::{ExitRecord, JobId, JobRunner, RawJobStatus};
use crate::{DsmcError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

/// Exit code dsmc uses for "completed with warnings".
pub const WARNING_EXIT_CODE: i32 = 8;

/// Semantic state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Pending,
    Running,
    Done,
    Error,
    Cancelled,
    Unknown,
}

impl JobOutcome {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobOutcome::Done | JobOutcome::Error | JobOutcome::Cancelled)
    }
}

impl From<RawJobStatus> for JobOutcome {
    fn from(status: RawJobStatus) -> Self {
        match status {
            RawJobStatus::Completed => JobOutcome::Done,
            RawJobStatus::Failed => JobOutcome::Error,
            RawJobStatus::Pending => JobOutcome::Pending,
            RawJobStatus::Running => JobOutcome::Running,
            RawJobStatus::Cancelled => JobOutcome::Cancelled,
            RawJobStatus::NotFound => JobOutcome::Unknown,
        }
    }
}

fn warning_regex() -> &'static Regex {
    static WARNING: OnceLock<Regex> = OnceLock::new();
    WARNING.get_or_init(|| Regex::new(r"ANS[0-9]+W").expect("valid warning regex"))
}

/// Whether `code` is exactly one dsmc warning code.
pub fn is_warning_code(code: &str) -> bool {
    warning_regex()
        .find(code)
        .is_some_and(|m| m.start() == 0 && m.end() == code.len())
}

/// Collect the distinct warning codes mentioned anywhere in `reader`.
///
/// Lines are decoded lossily; dsmc logs are not guaranteed to be UTF-8.
pub fn scan_warnings<R: BufRead>(mut reader: R) -> std::io::Result<BTreeSet<String>> {
    let mut warnings = BTreeSet::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        for m in warning_regex().find_iter(&text) {
            warnings.insert(m.as_str().to_string());
        }
    }

    Ok(warnings)
}

/// Maps runner statuses to [`JobOutcome`]s, applying the warning whitelist.
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    whitelist: BTreeSet<String>,
}

impl OutcomeClassifier {
    pub fn new(whitelist: BTreeSet<String>) -> Self {
        Self { whitelist }
    }

    pub fn whitelist(&self) -> &BTreeSet<String> {
        &self.whitelist
    }

    /// Classify a status, given the exit record when the job failed.
    ///
    /// A failed job without an exit record cannot be re-examined and stays
    /// [`JobOutcome::Error`].
    pub fn classify(&self, status: RawJobStatus, exit: Option<&ExitRecord>) -> Result<JobOutcome> {
        if status != RawJobStatus::Failed {
            return Ok(status.into());
        }

        match exit {
            Some(record) if record.exit_code == WARNING_EXIT_CODE => {
                self.classify_warning_log(&record.output_log)
            }
            Some(_) => Ok(JobOutcome::Error),
            None => {
                tracing::warn!("Failed job has no exit record, keeping it as error");
                Ok(JobOutcome::Error)
            }
        }
    }

    /// Decide a warning exit by the codes in its output log.
    ///
    /// A log without any warning code counts as done.
    pub fn classify_warning_log(&self, output_log: &Path) -> Result<JobOutcome> {
        let file = File::open(output_log).map_err(|source| DsmcError::Classification {
            path: output_log.to_path_buf(),
            source,
        })?;
        let warnings =
            scan_warnings(BufReader::new(file)).map_err(|source| DsmcError::Classification {
                path: output_log.to_path_buf(),
                source,
            })?;

        let unexpected: Vec<&String> = warnings
            .iter()
            .filter(|code| !self.whitelist.contains(*code))
            .collect();

        if unexpected.is_empty() {
            tracing::info!(
                "Exit code {} with only whitelisted warnings {:?}, treating as done",
                WARNING_EXIT_CODE,
                warnings
            );
            Ok(JobOutcome::Done)
        } else {
            tracing::warn!(
                "Exit code {} with non-whitelisted warnings {:?}",
                WARNING_EXIT_CODE,
                unexpected
            );
            Ok(JobOutcome::Error)
        }
    }

    /// Query the runner for `job_id` and classify the result.
    pub fn classify_job(&self, runner: &dyn JobRunner, job_id: JobId) -> Result<JobOutcome> {
        let status = runner.status(job_id);
        let exit = match status {
            RawJobStatus::Failed => runner.exit_record(job_id),
            _ => None,
        };
        self.classify(status, exit.as_ref())
    }

    /// Classify every job the runner knows about.
    pub fn classify_all(&self, runner: &dyn JobRunner) -> Result<HashMap<JobId, JobOutcome>> {
        runner
            .status_all()
            .into_iter()
            .map(|(job_id, status)| {
                let exit = match status {
                    RawJobStatus::Failed => runner.exit_record(job_id),
                    _ => None,
                };
                Ok((job_id, self.classify(status, exit.as_ref())?))
            })
            .collect()
    }
}
