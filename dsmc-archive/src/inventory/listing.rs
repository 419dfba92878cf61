//! Parsing of `dsmc q archive` listing output.
//!
//! A listing line looks like
//!
//! ```text
//!          4,096  B  2016-11-22 14:43:37    /archive/run1/Config Never 5f1c-uuid
//! ```
//!
//! The size column depends on the client locale: comma grouped (`4,096`),
//! space grouped (`4 096`) or the bare `0`. Everything after the size is at a
//! fixed token offset from it.

use super::{FileInventory, Provenance};
use crate::{DsmcError, Result};

/// Size column formats seen in dsmc listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    /// `4,096 B` or `512 B`
    CommaGrouped(u64),
    /// `4 096 B`, digit groups split by whitespace
    SpaceGrouped(u64),
    /// `0 B`
    BareZero,
}

impl SizeField {
    pub fn bytes(self) -> u64 {
        match self {
            SizeField::CommaGrouped(n) | SizeField::SpaceGrouped(n) => n,
            SizeField::BareZero => 0,
        }
    }

    /// Number of tokens the size occupies, unit excluded.
    fn width(self) -> usize {
        match self {
            SizeField::SpaceGrouped(_) => 2,
            SizeField::CommaGrouped(_) | SizeField::BareZero => 1,
        }
    }

    /// Index of the path token in a line whose size is `self`.
    ///
    /// Size and unit are followed by date and time, then the path.
    pub fn path_index(self) -> usize {
        self.width() + 3
    }
}

/// One parsed listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub size: SizeField,
    pub expires: Option<String>,
    pub description: Option<String>,
}

const UNIT: &str = "B";

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// `1`-`3` leading digits then `,ddd` groups.
fn comma_grouped(token: &str) -> Option<u64> {
    let mut groups = token.split(',');
    let head = groups.next()?;
    if !is_digits(head) || head.len() > 3 {
        return None;
    }
    let mut value: u64 = head.parse().ok()?;
    for group in groups {
        if group.len() != 3 || !is_digits(group) {
            return None;
        }
        value = value.checked_mul(1000)?.checked_add(group.parse::<u64>().ok()?)?;
    }
    Some(value)
}

/// Recognize the size column at the start of `tokens`.
///
/// Returns `None` when no known format matches; the unit token following the
/// size must be `B`. Space grouping is recognized for two groups only, so
/// sizes from 1 000 000 bytes up in that locale (`1 234 567 B`) do not parse
/// and fail the inventory they appear in.
pub fn parse_size_field(tokens: &[&str]) -> Option<SizeField> {
    match tokens {
        ["0", unit, ..] if *unit == UNIT => Some(SizeField::BareZero),
        [high, low, unit, ..]
            if *unit == UNIT
                && is_digits(high)
                && high.len() <= 3
                && low.len() == 3
                && is_digits(low) =>
        {
            let high: u64 = high.parse().ok()?;
            let low: u64 = low.parse().ok()?;
            Some(SizeField::SpaceGrouped(high * 1000 + low))
        }
        [size, unit, ..] if *unit == UNIT => comma_grouped(size).map(SizeField::CommaGrouped),
        _ => None,
    }
}

/// Parse one listing line into path, size, expiry and description.
pub fn parse_listing_line(line: &str) -> Result<RemoteEntry> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    let size = parse_size_field(&tokens)
        .ok_or_else(|| DsmcError::validation(line, "unrecognized size column"))?;

    let path = tokens
        .get(size.path_index())
        .ok_or_else(|| DsmcError::validation(line, "missing path column"))?;
    if !path.starts_with('/') {
        return Err(DsmcError::validation(line, "path is not absolute"));
    }

    let rest = &tokens[size.path_index() + 1..];
    let expires = rest.first().map(|s| s.to_string());
    let description = if rest.len() > 1 {
        Some(rest[1..].join(" "))
    } else {
        None
    };

    Ok(RemoteEntry {
        path: normalize(path).to_string(),
        size,
        expires,
        description,
    })
}

/// Directories are listed with a trailing slash by some client versions.
fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// Build the remote inventory from the raw lines of a listing.
///
/// Only lines mentioning `archive_path_prefix` are considered; any such line
/// that does not parse fails the whole inventory. Repeated paths keep the
/// last size seen.
pub fn parse_remote_inventory<S: AsRef<str>>(
    raw_lines: &[S],
    archive_path_prefix: &str,
) -> Result<FileInventory> {
    let mut inventory = FileInventory::new(Provenance::Remote);

    for line in raw_lines.iter().map(AsRef::as_ref) {
        if !line.contains(archive_path_prefix) {
            continue;
        }

        let entry = parse_listing_line(line)?;
        if !entry.path.starts_with(archive_path_prefix) {
            return Err(DsmcError::validation(
                line,
                format!("path is outside of {}", archive_path_prefix),
            ));
        }

        if let Some(previous) = inventory.insert(entry.path.clone(), entry.size.bytes()) {
            tracing::debug!(
                "Duplicate listing entry for {} ({} -> {} bytes)",
                entry.path,
                previous,
                entry.size.bytes()
            );
        }
    }

    Ok(inventory)
}
