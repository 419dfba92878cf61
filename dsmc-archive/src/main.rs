//! dsmc-archive - Main entry point
//!
//! Offline access to the archive operations that do not need a job runner.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dsmc_archive::dsmc::DsmcClient;
use dsmc_archive::fs::compress::compress;
use dsmc_archive::fs::tree::{create_archive_tree, TreeFilter};
use dsmc_archive::jobs::{ExitRecord, OutcomeClassifier, RawJobStatus};
use dsmc_archive::reconcile::{Reconciler, ReuploadSettings};
use dsmc_archive::service::validate_runfolder;
use dsmc_archive::{config::Config, utils};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the service version
    Version,

    /// Build the symlink archive tree of a monitored runfolder
    CreateArchive {
        runfolder: String,

        /// Replace an existing archive tree
        #[arg(long)]
        remove: bool,
    },

    /// Compress an archive tree, keeping passthrough entries
    Compress { runfolder: String },

    /// List the files of an archive tree missing from its latest upload
    ReuploadSet { runfolder: String },

    /// Classify a failed dsmc run from its exit code and output log
    Classify {
        #[arg(long)]
        exit_code: i32,

        #[arg(long, value_name = "FILE")]
        log: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(command: Command, config: &Config) -> Result<()> {
    let paths = &config.paths;

    match command {
        Command::Version => {
            println!("{}", dsmc_archive::VERSION);
        }
        Command::CreateArchive { runfolder, remove } => {
            validate_runfolder(&runfolder)?;
            let filter = TreeFilter::new(
                config.archive.exclude_dirs.iter().cloned(),
                &config.archive.exclude_extensions,
            );
            let summary = create_archive_tree(
                &paths.monitored_directory.join(&runfolder),
                &paths.archive_root.join(&runfolder),
                &filter,
                remove,
            )?;
            print_json(&summary)?;
        }
        Command::Compress { runfolder } => {
            validate_runfolder(&runfolder)?;
            let summary = compress(
                &paths.archive_root.join(&runfolder),
                &config.archive.passthrough,
                config.archive.compression_level,
            )?;
            print_json(&summary)?;
        }
        Command::ReuploadSet { runfolder } => {
            validate_runfolder(&runfolder)?;
            let settings = ReuploadSettings {
                dsmc_binary: config.dsmc.binary.clone(),
                cores: config.dsmc.number_of_cores,
                scratch_directory: paths.scratch_directory.clone(),
                log_directory: paths.dsmc_log_directory.clone(),
            };
            let reconciler = Reconciler::new(DsmcClient::new(&config.dsmc.binary), settings);
            let (version, files) = reconciler.reupload_set(&paths.archive_root.join(&runfolder))?;
            print_json(&serde_json::json!({
                "version": version,
                "files": files,
            }))?;
        }
        Command::Classify { exit_code, log } => {
            let classifier = OutcomeClassifier::new(config.dsmc.whitelisted_warnings.clone());
            let record = ExitRecord {
                exit_code,
                output_log: log,
            };
            let outcome = classifier.classify(RawJobStatus::Failed, Some(&record))?;
            print_json(&outcome)?;
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("Starting dsmc-archive v{}", dsmc_archive::VERSION);

    if let Err(e) = run(args.command, &config) {
        tracing::error!("{:#}", e);
        return Err(e);
    }

    Ok(())
}
