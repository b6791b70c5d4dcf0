//! Dated snapshot folder discovery
//!
//! Snapshot landings are dated folders (YYYY-MM-DD) under a configured
//! object-store prefix. Resolution is split into a pure parsing core that
//! operates on a listing of names and an I/O shell on the object-store
//! client, so the ordering rules are testable without a live store.
//!
//! Ordering is chronological by calendar date, never lexical.

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

/// Result type for folder resolution
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors raised while resolving dated snapshot folders
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No dated snapshot folders found in listing")]
    NotFound,

    #[error("Malformed snapshot folder name: {0}")]
    Malformed(String),

    #[error("Folder pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

const FOLDER_PATTERN: &str = r"^(\d{4})-(\d{2})-(\d{2})$";

/// A dated snapshot folder discovered in the object store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedFolder {
    /// Folder name as it appears in the store (e.g. "2022-04-01")
    pub name: String,
    /// Calendar date parsed from the name
    pub date: NaiveDate,
}

impl DatedFolder {
    /// Parse a single listing entry as a dated folder
    ///
    /// Accepts a bare segment ("2022-04-01"), a trailing-slash form, or a
    /// full key whose last segment is the dated folder. Non-zero-padded
    /// segments are rejected as malformed.
    pub fn parse(entry: &str) -> Result<Self> {
        let pattern = Regex::new(FOLDER_PATTERN)?;
        Self::parse_with(&pattern, entry)
    }

    fn parse_with(pattern: &Regex, entry: &str) -> Result<Self> {
        let trimmed = entry.trim_end_matches('/');
        let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);

        let captures = pattern
            .captures(segment)
            .ok_or_else(|| ResolveError::Malformed(entry.to_string()))?;

        let year: i32 = captures[1]
            .parse()
            .map_err(|_| ResolveError::Malformed(entry.to_string()))?;
        let month: u32 = captures[2]
            .parse()
            .map_err(|_| ResolveError::Malformed(entry.to_string()))?;
        let day: u32 = captures[3]
            .parse()
            .map_err(|_| ResolveError::Malformed(entry.to_string()))?;

        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| ResolveError::Malformed(entry.to_string()))?;

        Ok(Self {
            name: segment.to_string(),
            date,
        })
    }
}

impl PartialOrd for DatedFolder {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DatedFolder {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by calendar date, then by name
        match self.date.cmp(&other.date) {
            std::cmp::Ordering::Equal => self.name.cmp(&other.name),
            other => other,
        }
    }
}

impl std::fmt::Display for DatedFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Parse every entry of a listing as a dated folder
///
/// Entries that do not parse are logged and skipped; they only become an
/// error when nothing in the listing parses. The returned folders are
/// sorted chronologically ascending with duplicates removed.
pub fn parse_dated_folders(entries: &[String]) -> Result<Vec<DatedFolder>> {
    let pattern = Regex::new(FOLDER_PATTERN)?;
    let mut folders = Vec::new();

    for entry in entries {
        match DatedFolder::parse_with(&pattern, entry) {
            Ok(folder) => folders.push(folder),
            Err(ResolveError::Malformed(name)) => {
                warn!(entry = %name, "Skipping listing entry that is not a dated snapshot folder");
            }
            Err(err) => return Err(err),
        }
    }

    if folders.is_empty() {
        return Err(ResolveError::NotFound);
    }

    folders.sort();
    folders.dedup();

    Ok(folders)
}

/// Return the most recent snapshot folder in a listing
pub fn latest_folder(entries: &[String]) -> Result<DatedFolder> {
    let folders = parse_dated_folders(entries)?;
    folders.into_iter().next_back().ok_or(ResolveError::NotFound)
}
