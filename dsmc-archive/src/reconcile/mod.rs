//! Reconciliation of a local archive tree against its remote upload.
//!
//! Finds the latest description an archive was uploaded under, lists what the
//! remote store holds for it, and derives the files that have to be uploaded
//! again. Every step fails loudly: an incomplete inventory could hide missing
//! files.

pub mod diff;
pub mod filelist;

use crate::dsmc::{command, ArchiveQuery, RemoteStore};
use crate::inventory::{
    build_local_inventory, parse_listing_line, parse_remote_inventory, FileInventory,
};
use crate::jobs::{JobId, JobRequest, JobRunner};
use crate::{DsmcError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use diff::{diff, ReuploadSet};

/// Description token of one upload of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ArchiveVersion(String);

impl ArchiveVersion {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A submitted re-upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReuploadJob {
    pub job_id: JobId,
    pub version: ArchiveVersion,
    pub filelist: PathBuf,
    pub dsmc_log: PathBuf,
    pub file_count: usize,
}

/// Result of asking for a re-upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReuploadOutcome {
    /// Remote already holds every local file.
    NothingToDo,
    Submitted(ReuploadJob),
}

/// Where re-upload jobs put their file lists and logs, and how they run dsmc.
#[derive(Debug, Clone)]
pub struct ReuploadSettings {
    pub dsmc_binary: PathBuf,
    pub cores: usize,
    pub scratch_directory: PathBuf,
    pub log_directory: PathBuf,
}

pub struct Reconciler<S> {
    store: S,
    settings: ReuploadSettings,
}

fn archive_key(archive_path: &Path) -> String {
    let path = archive_path.to_string_lossy();
    if path.len() > 1 {
        path.trim_end_matches('/').to_string()
    } else {
        path.into_owned()
    }
}

/// `path` is `key` itself or lies below it; `/archive/run10` is not within
/// `/archive/run1`.
fn is_within(path: &str, key: &str) -> bool {
    match path.strip_prefix(key) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || key == "/",
        None => false,
    }
}

impl<S: RemoteStore> Reconciler<S> {
    pub fn new(store: S, settings: ReuploadSettings) -> Self {
        Self { store, settings }
    }

    /// Description of the most recent upload of `archive_path`.
    ///
    /// The listing holds the archive root and the entries directly below it.
    /// Listings are oldest first, so the last matching line wins.
    pub fn resolve_latest_version(&self, archive_path: &Path) -> Result<ArchiveVersion> {
        let key = archive_key(archive_path);
        let lines = self
            .store
            .query_archive(&ArchiveQuery::uploads_of(archive_path))?;

        let mut latest = None;
        for line in lines.iter().filter(|line| line.contains(key.as_str())) {
            let entry = parse_listing_line(line)?;
            if !is_within(&entry.path, &key) {
                continue;
            }
            match entry.description {
                Some(description) => latest = Some(description),
                None => return Err(DsmcError::validation(line, "missing description")),
            }
        }

        let version = latest.map(ArchiveVersion::new).ok_or_else(|| {
            DsmcError::NotFound(format!("no upload of {} in the remote store", key))
        })?;

        info!("Latest upload of {} has description {}", key, version);
        Ok(version)
    }

    /// Everything the remote store holds below `archive_path` for `version`.
    pub fn fetch_remote_inventory(
        &self,
        archive_path: &Path,
        version: &ArchiveVersion,
    ) -> Result<FileInventory> {
        let lines = self
            .store
            .query_archive(&ArchiveQuery::contents_of(archive_path, version.as_str()))?;
        parse_remote_inventory(&lines, &archive_key(archive_path))
    }

    /// Resolve the latest version of `archive_path` and compute which local
    /// files are missing from it or differ in size.
    pub fn reupload_set(&self, archive_path: &Path) -> Result<(ArchiveVersion, ReuploadSet)> {
        let version = self.resolve_latest_version(archive_path)?;
        let remote = self.fetch_remote_inventory(archive_path, &version)?;
        let local = build_local_inventory(archive_path)?;

        let files = diff(&local, &remote);
        info!(
            "{}: {} local files, {} remote entries, {} to re-upload",
            archive_path.display(),
            local.len(),
            remote.len(),
            files.len()
        );

        Ok((version, files))
    }

    /// Submit one dsmc invocation uploading `files` under `version`.
    ///
    /// An empty set submits nothing.
    pub fn trigger_reupload(
        &self,
        runner: &dyn JobRunner,
        files: &ReuploadSet,
        version: &ArchiveVersion,
        correlation_id: &str,
    ) -> Result<ReuploadOutcome> {
        if files.is_empty() {
            info!("[{}] Nothing to re-upload for {}", correlation_id, version);
            return Ok(ReuploadOutcome::NothingToDo);
        }

        let filelist =
            filelist::write_filelist(&self.settings.scratch_directory, correlation_id, files)?;
        let dsmc_log = self.settings.log_directory.join(format!(
            "dsmc_reupload_{}-{}",
            correlation_id,
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S")
        ));

        let request = JobRequest {
            command: command::archive_filelist(
                &self.settings.dsmc_binary,
                &filelist,
                version.as_str(),
            ),
            cores: self.settings.cores,
            work_dir: self.settings.scratch_directory.clone(),
            stdout: dsmc_log.clone(),
            stderr: dsmc_log.clone(),
        };

        let job_id = match runner.submit(request) {
            Ok(job_id) => job_id,
            Err(e) => {
                warn!("[{}] Re-upload job was rejected: {:#}", correlation_id, e);
                if let Err(cleanup) = std::fs::remove_file(&filelist) {
                    warn!(
                        "[{}] Could not remove file list {}: {}",
                        correlation_id,
                        filelist.display(),
                        cleanup
                    );
                }
                return Err(DsmcError::Submission(format!("{:#}", e)));
            }
        };

        info!(
            "[{}] Submitted re-upload of {} files as job {}",
            correlation_id,
            files.len(),
            job_id
        );

        Ok(ReuploadOutcome::Submitted(ReuploadJob {
            job_id,
            version: version.clone(),
            filelist,
            dsmc_log,
            file_count: files.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsmc::MockRemoteStore;
    use crate::jobs::MockJobRunner;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn settings(scratch: &Path) -> ReuploadSettings {
        ReuploadSettings {
            dsmc_binary: PathBuf::from("dsmc"),
            cores: 1,
            scratch_directory: scratch.to_path_buf(),
            log_directory: scratch.to_path_buf(),
        }
    }

    fn listing(lines: &[String]) -> Vec<String> {
        let mut out = vec![
            "IBM Spectrum Protect".to_string(),
            "             Size  Archive Date - Time    File - Expires on - Description".to_string(),
            "             ----  -------------------    -------------------------------".to_string(),
        ];
        out.extend_from_slice(lines);
        out
    }

    #[test]
    fn test_resolve_latest_version_takes_last_match() {
        let mut store = MockRemoteStore::new();
        store
            .expect_query_archive()
            .withf(|q| !q.subdir && q.description.is_none())
            .returning(|_| {
                Ok(listing(&[
                    "4,096  B  2016-11-22 14:43:37    /archive/run1 Never first-uuid".to_string(),
                    "4,096  B  2016-12-01 08:00:00    /archive/run1 Never second-uuid".to_string(),
                ]))
            });

        let reconciler = Reconciler::new(store, settings(Path::new("/tmp")));
        let version = reconciler.resolve_latest_version(Path::new("/archive/run1")).unwrap();
        assert_eq!(version, ArchiveVersion::new("second-uuid"));
    }

    #[test]
    fn test_resolve_latest_version_from_child_entries() {
        let mut store = MockRemoteStore::new();
        store
            .expect_query_archive()
            .withf(|q| !q.subdir)
            .returning(|_| {
                Ok(listing(&[
                    "4,096  B  2016-11-22 14:43:37    /archive/run1/Config Never old-uuid"
                        .to_string(),
                    "1,523  B  2016-12-01 08:00:00    /archive/run1/RunInfo.xml Never new-uuid"
                        .to_string(),
                    "4,096  B  2016-12-02 09:00:00    /archive/run10/Config Never other-uuid"
                        .to_string(),
                ]))
            });

        let reconciler = Reconciler::new(store, settings(Path::new("/tmp")));
        let version = reconciler
            .resolve_latest_version(Path::new("/archive/run1"))
            .unwrap();
        assert_eq!(version, ArchiveVersion::new("new-uuid"));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/archive/run1", "/archive/run1"));
        assert!(is_within("/archive/run1/Data/a.bcl", "/archive/run1"));
        assert!(!is_within("/archive/run10", "/archive/run1"));
        assert!(!is_within("/archive", "/archive/run1"));
    }

    #[test]
    fn test_resolve_latest_version_not_found() {
        let mut store = MockRemoteStore::new();
        store.expect_query_archive().returning(|_| Ok(listing(&[])));

        let reconciler = Reconciler::new(store, settings(Path::new("/tmp")));
        let err = reconciler.resolve_latest_version(Path::new("/archive/run1")).unwrap_err();
        assert!(matches!(err, DsmcError::NotFound(_)));
    }

    #[test]
    fn test_resolve_ignores_sibling_archives() {
        let mut store = MockRemoteStore::new();
        store.expect_query_archive().returning(|_| {
            Ok(listing(&[
                "4,096  B  2016-11-22 14:43:37    /archive/run1 Never run1-uuid".to_string(),
                "4,096  B  2016-12-01 08:00:00    /archive/run10 Never run10-uuid".to_string(),
            ]))
        });

        let reconciler = Reconciler::new(store, settings(Path::new("/tmp")));
        let version = reconciler.resolve_latest_version(Path::new("/archive/run1/")).unwrap();
        assert_eq!(version.as_str(), "run1-uuid");
    }

    #[test]
    fn test_remote_command_failure_propagates() {
        let mut store = MockRemoteStore::new();
        store.expect_query_archive().returning(|_| {
            Err(DsmcError::RemoteCommand {
                command: "dsmc q archive".to_string(),
                code: Some(12),
                stderr: String::new(),
            })
        });

        let reconciler = Reconciler::new(store, settings(Path::new("/tmp")));
        assert!(matches!(
            reconciler.resolve_latest_version(Path::new("/archive/run1")),
            Err(DsmcError::RemoteCommand { code: Some(12), .. })
        ));
    }

    #[test]
    fn test_reupload_set_against_local_tree() -> Result<()> {
        let archive = TempDir::new()?;
        let root = archive.path().to_path_buf();
        fs::create_dir(root.join("Data"))?;
        fs::write(root.join("Data/same.bcl"), vec![0u8; 4096])?;
        fs::write(root.join("Data/stale.bcl"), vec![0u8; 10])?;
        fs::write(root.join("missing.txt"), b"abc")?;

        let key = root.to_string_lossy().to_string();
        let mut store = MockRemoteStore::new();
        let uploads_key = key.clone();
        store
            .expect_query_archive()
            .withf(|q| !q.subdir)
            .returning(move |_| {
                Ok(listing(&[format!(
                    "4,096  B  2016-11-22 14:43:37    {} Never v1",
                    uploads_key
                )]))
            });
        store
            .expect_query_archive()
            .withf(|q| q.subdir && q.description.as_deref() == Some("v1"))
            .returning(move |_| {
                Ok(listing(&[
                    format!("4,096  B  2016-11-22 14:43:37    {} Never v1", key),
                    format!("4,096  B  2016-11-22 14:43:37    {}/Data Never v1", key),
                    format!("4 096  B  2016-11-22 14:43:37    {}/Data/same.bcl Never v1", key),
                    format!("0  B  2016-11-22 14:43:37    {}/Data/stale.bcl Never v1", key),
                    format!("7  B  2016-11-22 14:43:37    {}/remote-only.txt Never v1", key),
                ]))
            });

        let reconciler = Reconciler::new(store, settings(Path::new("/tmp")));
        let (version, files) = reconciler.reupload_set(&root)?;

        assert_eq!(version.as_str(), "v1");
        let got: BTreeSet<String> = files.iter().map(str::to_string).collect();
        let expected: BTreeSet<String> = [
            root.join("Data/stale.bcl"),
            root.join("missing.txt"),
        ]
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
        assert_eq!(got, expected);
        Ok(())
    }

    #[test]
    fn test_empty_set_submits_nothing() {
        let mut runner = MockJobRunner::new();
        runner.expect_submit().never();

        let reconciler = Reconciler::new(MockRemoteStore::new(), settings(Path::new("/tmp")));
        let outcome = reconciler
            .trigger_reupload(&runner, &ReuploadSet::default(), &ArchiveVersion::new("v1"), "req-1")
            .unwrap();
        assert_eq!(outcome, ReuploadOutcome::NothingToDo);
    }

    #[test]
    fn test_trigger_reupload_submits_filelist() -> Result<()> {
        let scratch = TempDir::new()?;
        let mut runner = MockJobRunner::new();
        runner
            .expect_submit()
            .withf(|req| {
                req.command.contains("archive -filelist=")
                    && req.command.ends_with("-description='v1'")
                    && req.stdout == req.stderr
            })
            .times(1)
            .returning(|_| Ok(42));

        let files = ReuploadSet::from(vec![
            "/archive/run1/a".to_string(),
            "/archive/run1/b c".to_string(),
        ]);
        let reconciler = Reconciler::new(MockRemoteStore::new(), settings(scratch.path()));
        let outcome =
            reconciler.trigger_reupload(&runner, &files, &ArchiveVersion::new("v1"), "req-1")?;

        let ReuploadOutcome::Submitted(job) = outcome else {
            panic!("expected a submitted job");
        };
        assert_eq!(job.job_id, 42);
        assert_eq!(job.file_count, 2);
        assert!(job.filelist.starts_with(scratch.path()));
        let content = fs::read_to_string(&job.filelist)?;
        assert_eq!(content, "\"/archive/run1/a\"\n\"/archive/run1/b c\"\n");
        Ok(())
    }

    #[test]
    fn test_rejected_submission() {
        let scratch = TempDir::new().unwrap();
        let mut runner = MockJobRunner::new();
        runner
            .expect_submit()
            .returning(|_| Err(anyhow::anyhow!("no free slots")));

        let files = ReuploadSet::from(vec!["/archive/run1/a".to_string()]);
        let reconciler = Reconciler::new(MockRemoteStore::new(), settings(scratch.path()));
        let err = reconciler
            .trigger_reupload(&runner, &files, &ArchiveVersion::new("v1"), "req-1")
            .unwrap_err();
        assert!(matches!(err, DsmcError::Submission(msg) if msg.contains("no free slots")));
        // The file list of a rejected job is not left behind
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
