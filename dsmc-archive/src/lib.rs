//! dsmc Archive Library
//!
//! Stages runfolders as symlink archive trees, reconciles them against what
//! the dsmc remote store holds, and interprets the outcome of dsmc jobs.

pub mod config;
pub mod dsmc;
pub mod fs;
pub mod inventory;
pub mod jobs;
pub mod reconcile;
pub mod service;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use service::ArchiveService;
pub use utils::errors::DsmcError;
pub type Result<T> = std::result::Result<T, DsmcError>;

/// Version reported alongside started jobs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
