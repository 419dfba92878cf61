//! File inventories: which files exist under an archive and how big they are.
//!
//! Two provenances feed the same model: a walk of the local archive tree and
//! the parsed output of a remote `dsmc q archive` listing.

pub mod listing;

use crate::fs::walker::{walk_directory, WalkOptions};
use crate::{DsmcError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

pub use listing::{
    parse_listing_line, parse_remote_inventory, parse_size_field, RemoteEntry, SizeField,
};

/// Where an inventory was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Local,
    Remote,
}

/// Absolute file path -> size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInventory {
    provenance: Provenance,
    files: HashMap<String, u64>,
}

impl FileInventory {
    pub fn new(provenance: Provenance) -> Self {
        Self {
            provenance,
            files: HashMap::new(),
        }
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Record a file, replacing any earlier size for the same path.
    pub fn insert(&mut self, path: impl Into<String>, size: u64) -> Option<u64> {
        self.files.insert(path.into(), size)
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.files.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.files.iter().map(|(path, size)| (path.as_str(), *size))
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().sum()
    }
}

/// Walk `archive_path` and record every file with its exact size.
///
/// Symlinks to regular files count as files of their target's size, since
/// dsmc archives link targets. `archive_path` must be absolute so that keys
/// line up with the remote listing.
pub fn build_local_inventory(archive_path: &Path) -> Result<FileInventory> {
    if !archive_path.is_absolute() {
        return Err(DsmcError::InvalidRequest(format!(
            "archive path {} is not absolute",
            archive_path.display()
        )));
    }

    let files = walk_directory(archive_path, WalkOptions::default())?;

    let mut inventory = FileInventory::new(Provenance::Local);
    for file in files.into_iter().filter(|f| !f.is_dir) {
        inventory.insert(file.path.to_string_lossy().into_owned(), file.size);
    }

    tracing::debug!(
        "Local inventory of {}: {} files, {} bytes",
        archive_path.display(),
        inventory.len(),
        inventory.total_bytes()
    );

    Ok(inventory)
}
