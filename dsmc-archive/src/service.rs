//! Operations exposed to the REST layer.
//!
//! `ArchiveService` ties the configuration, the remote store and the injected
//! job runner together. It returns typed results and [`DsmcError`]s; mapping
//! them to HTTP responses is the caller's business.

use crate::config::Config;
use crate::dsmc::{command, RemoteStore};
use crate::fs::compress::{compress, CompressionSummary};
use crate::fs::tree::{create_archive_tree, TreeFilter, TreeSummary};
use crate::jobs::{JobId, JobOutcome, JobRequest, JobRunner, OutcomeClassifier};
use crate::reconcile::{
    ArchiveVersion, Reconciler, ReuploadOutcome, ReuploadSet, ReuploadSettings,
};
use crate::{DsmcError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// A freshly submitted archive job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedJob {
    pub job_id: JobId,
    pub description: String,
    pub dsmc_log: PathBuf,
    pub service_version: &'static str,
}

pub struct ArchiveService<S> {
    config: Config,
    runner: Arc<dyn JobRunner>,
    reconciler: Reconciler<S>,
    classifier: OutcomeClassifier,
}

/// Runfolder names come from URLs and end up in shell commands.
pub fn validate_runfolder(runfolder: &str) -> Result<()> {
    let valid = !runfolder.is_empty()
        && runfolder
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DsmcError::InvalidRequest(format!(
            "{:?} is not a valid runfolder name",
            runfolder
        )))
    }
}

impl<S: RemoteStore> ArchiveService<S> {
    pub fn new(config: Config, store: S, runner: Arc<dyn JobRunner>) -> Self {
        let settings = ReuploadSettings {
            dsmc_binary: config.dsmc.binary.clone(),
            cores: config.dsmc.number_of_cores,
            scratch_directory: config.paths.scratch_directory.clone(),
            log_directory: config.paths.dsmc_log_directory.clone(),
        };
        let classifier = OutcomeClassifier::new(config.dsmc.whitelisted_warnings.clone());

        Self {
            reconciler: Reconciler::new(store, settings),
            classifier,
            runner,
            config,
        }
    }

    pub fn version(&self) -> &'static str {
        crate::VERSION
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn archive_path(&self, runfolder: &str) -> Result<PathBuf> {
        validate_runfolder(runfolder)?;
        Ok(self.config.paths.archive_root.join(runfolder))
    }

    fn existing_archive(&self, runfolder: &str) -> Result<PathBuf> {
        let path = self.archive_path(runfolder)?;
        if !path.is_dir() {
            return Err(DsmcError::NotFound(format!(
                "{} is not found under {}",
                runfolder,
                self.config.paths.archive_root.display()
            )));
        }
        Ok(path)
    }

    /// Submit `dsmc archive` for a whole archive tree under a new description.
    pub fn start_archive(&self, runfolder: &str) -> Result<StartedJob> {
        let archive_path = self.existing_archive(runfolder)?;

        let log_dir = &self.config.paths.dsmc_log_directory;
        if !log_dir.is_dir() {
            return Err(DsmcError::Config(format!(
                "{} is not a directory",
                log_dir.display()
            )));
        }

        let description = uuid::Uuid::new_v4().to_string();
        let dsmc_log = log_dir.join(format!(
            "dsmc_{}_{}-{}",
            runfolder,
            description,
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S")
        ));

        let request = JobRequest {
            command: command::archive_directory(
                &self.config.dsmc.binary,
                &archive_path,
                &description,
                &dsmc_log,
            ),
            cores: self.config.dsmc.number_of_cores,
            work_dir: self.config.paths.archive_root.clone(),
            stdout: dsmc_log.clone(),
            stderr: dsmc_log.clone(),
        };

        let job_id = self
            .runner
            .submit(request)
            .map_err(|e| DsmcError::Submission(format!("{:#}", e)))?;

        info!(
            "Started archive of {} as job {} (description {})",
            runfolder, job_id, description
        );

        Ok(StartedJob {
            job_id,
            description,
            dsmc_log,
            service_version: crate::VERSION,
        })
    }

    pub fn status(&self, job_id: JobId) -> Result<JobOutcome> {
        self.classifier.classify_job(self.runner.as_ref(), job_id)
    }

    pub fn status_all(&self) -> Result<HashMap<JobId, JobOutcome>> {
        self.classifier.classify_all(self.runner.as_ref())
    }

    pub fn stop(&self, job_id: JobId) -> Option<JobId> {
        info!("Attempting to stop job {}", job_id);
        self.runner.cancel(job_id)
    }

    pub fn stop_all(&self) {
        info!("Attempting to stop all jobs");
        self.runner.cancel_all();
    }

    /// Files of `runfolder`'s archive tree missing from its latest upload.
    pub fn reupload_set(&self, runfolder: &str) -> Result<(ArchiveVersion, ReuploadSet)> {
        let archive_path = self.existing_archive(runfolder)?;
        self.reconciler.reupload_set(&archive_path)
    }

    /// Upload whatever the latest upload of `runfolder` is missing.
    pub fn reupload(&self, runfolder: &str, correlation_id: &str) -> Result<ReuploadOutcome> {
        let (version, files) = self.reupload_set(runfolder)?;
        self.reconciler
            .trigger_reupload(self.runner.as_ref(), &files, &version, correlation_id)
    }

    /// Materialize the archive tree of a monitored runfolder.
    pub fn create_archive(&self, runfolder: &str, remove: bool) -> Result<TreeSummary> {
        let dest = self.archive_path(runfolder)?;
        let source = self.config.paths.monitored_directory.join(runfolder);
        let filter = TreeFilter::new(
            self.config.archive.exclude_dirs.iter().cloned(),
            &self.config.archive.exclude_extensions,
        );
        create_archive_tree(&source, &dest, &filter, remove)
    }

    /// Compress an archive tree, keeping the configured passthrough entries.
    pub fn compress_archive(&self, runfolder: &str) -> Result<CompressionSummary> {
        let archive_path = self.existing_archive(runfolder)?;
        compress(
            &archive_path,
            &self.config.archive.passthrough,
            self.config.archive.compression_level,
        )
    }
}
