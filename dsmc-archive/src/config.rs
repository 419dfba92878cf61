//! Configuration management for the archive service.
//!
//! Loads configuration from a TOML file and validates it before use.

use crate::jobs::outcome::is_warning_code;
use crate::{DsmcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub dsmc: DsmcConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the runfolders to archive
    pub monitored_directory: PathBuf,

    /// Directory under which archive trees are materialized
    pub archive_root: PathBuf,

    /// Where dsmc job output logs are written
    pub dsmc_log_directory: PathBuf,

    /// Where file lists for re-uploads are written
    #[serde(default = "default_scratch_directory")]
    pub scratch_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsmcConfig {
    /// dsmc executable, resolved through PATH when not absolute
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Cores requested from the job runner per dsmc invocation
    #[serde(default = "default_number_of_cores")]
    pub number_of_cores: usize,

    /// Warning codes that do not fail a job exiting with code 8
    #[serde(default = "default_whitelisted_warnings")]
    pub whitelisted_warnings: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory names left out of archive trees
    #[serde(default)]
    pub exclude_dirs: Vec<String>,

    /// File extensions left out of archive trees (".bcl" or "bcl")
    #[serde(default)]
    pub exclude_extensions: Vec<String>,

    /// Entries kept next to the compressed archive instead of inside it
    #[serde(default = "default_passthrough")]
    pub passthrough: Vec<String>,

    /// zstd compression level (1-22)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_scratch_directory() -> PathBuf {
    std::env::temp_dir()
}

fn default_binary() -> PathBuf {
    PathBuf::from("dsmc")
}

fn default_number_of_cores() -> usize {
    1
}

fn default_whitelisted_warnings() -> BTreeSet<String> {
    // ANS1809W: session lost and re-established
    BTreeSet::from(["ANS1809W".to_string()])
}

fn default_passthrough() -> Vec<String> {
    vec!["SampleSheet.csv".to_string(), "RunInfo.xml".to_string()]
}

fn default_compression_level() -> i32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DsmcConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            number_of_cores: default_number_of_cores(),
            whitelisted_warnings: default_whitelisted_warnings(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: Vec::new(),
            exclude_extensions: Vec::new(),
            passthrough: default_passthrough(),
            compression_level: default_compression_level(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            paths: PathsConfig {
                monitored_directory: PathBuf::from("/data/runfolders"),
                archive_root: PathBuf::from("/data/archives"),
                dsmc_log_directory: PathBuf::from("/var/log/dsmc"),
                scratch_directory: default_scratch_directory(),
            },
            dsmc: DsmcConfig::default(),
            archive: ArchiveConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| DsmcError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every option and normalize extension filters to ".ext" form.
    pub fn validate(&mut self) -> Result<()> {
        let paths = [
            ("monitored_directory", &self.paths.monitored_directory),
            ("archive_root", &self.paths.archive_root),
            ("dsmc_log_directory", &self.paths.dsmc_log_directory),
            ("scratch_directory", &self.paths.scratch_directory),
        ];
        for (name, path) in paths {
            if !path.is_absolute() {
                return Err(DsmcError::Config(format!(
                    "{} must be an absolute path, got {}",
                    name,
                    path.display()
                )));
            }
        }

        if self.dsmc.number_of_cores == 0 {
            return Err(DsmcError::Config(
                "number_of_cores must be at least 1".to_string(),
            ));
        }

        if let Some(bad) = self
            .dsmc
            .whitelisted_warnings
            .iter()
            .find(|code| !is_warning_code(code))
        {
            return Err(DsmcError::Config(format!(
                "whitelisted warning {:?} is not a dsmc warning code (ANS<digits>W)",
                bad
            )));
        }

        if !(1..=22).contains(&self.archive.compression_level) {
            return Err(DsmcError::Config(format!(
                "compression_level must be within 1-22, got {}",
                self.archive.compression_level
            )));
        }

        for name in self.archive.exclude_dirs.iter().chain(&self.archive.passthrough) {
            if name.is_empty() || name.contains('/') {
                return Err(DsmcError::Config(format!(
                    "{:?} is not a plain file or directory name",
                    name
                )));
            }
        }

        let mut extensions = Vec::with_capacity(self.archive.exclude_extensions.len());
        for ext in &self.archive.exclude_extensions {
            let trimmed = ext.trim_start_matches('.');
            if trimmed.is_empty() {
                return Err(DsmcError::Config(format!("empty file extension {:?}", ext)));
            }
            extensions.push(format!(".{}", trimmed));
        }
        self.archive.exclude_extensions = extensions;

        Ok(())
    }
}
