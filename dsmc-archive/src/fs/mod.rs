//! File system operations on runfolders and archive trees.

pub mod compress;
pub mod tree;
pub mod walker;
