//! Local vs. remote inventory comparison.

use crate::inventory::FileInventory;
use serde::Serialize;

/// Local paths that have to be uploaded again, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReuploadSet(Vec<String>);

impl ReuploadSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for ReuploadSet {
    fn from(mut paths: Vec<String>) -> Self {
        paths.sort();
        paths.dedup();
        Self(paths)
    }
}

/// Every local path that is absent remotely or has a different remote size.
///
/// The local inventory is authoritative; remote-only entries (including the
/// directories dsmc lists) are ignored.
pub fn diff(local: &FileInventory, remote: &FileInventory) -> ReuploadSet {
    let stale: Vec<String> = local
        .iter()
        .filter(|(path, size)| remote.get(path) != Some(*size))
        .map(|(path, _)| path.to_string())
        .collect();

    ReuploadSet::from(stale)
}
