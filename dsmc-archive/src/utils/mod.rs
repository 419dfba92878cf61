//! Utility modules for the archive service.

pub mod errors;
pub mod logger;

pub use errors::{DsmcError, Result};
