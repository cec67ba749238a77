//! Username and password list files.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read a list file: one value per line, trailing whitespace removed,
/// blank lines dropped.
pub fn read_list(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read list file {}", path.display()))?;
    let values = parse_list(&contents);

    tracing::debug!("Loaded {} entries from {}", values.len(), path.display());
    Ok(values)
}

/// Split list contents into values.
#[must_use]
pub fn parse_list(contents: &str) -> Vec<String> {
    contents
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(ToString::to_string)
        .collect()
}
