//! Entry codec: flat newline-delimited text <-> ordered memory entries.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One remembered line of text.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(transparent)]
pub struct MemoryEntry {
    content: String,
}

impl MemoryEntry {
    /// Build an entry from a single line. Callers go through [`split_input`]
    /// or [`decode`], which guarantee no newline reaches here.
    fn from_line(line: &str) -> Self {
        Self {
            content: line.to_string(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Case-sensitive substring match.
    pub fn matches(&self, query: &str) -> bool {
        self.content.contains(query)
    }
}

impl std::fmt::Display for MemoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.content)
    }
}

/// Decode the persisted resource into entries, in file order.
///
/// Lines are split on `\n`, a trailing `\r` is dropped, and blank lines are
/// skipped. Anything else is kept exactly as stored.
pub fn decode(raw: &[u8]) -> Result<Vec<MemoryEntry>> {
    let text = std::str::from_utf8(raw).map_err(|e| {
        Error::Decode(format!(
            "memory file is not valid UTF-8 (at byte {})",
            e.valid_up_to()
        ))
    })?;

    Ok(text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .map(MemoryEntry::from_line)
        .collect())
}

/// Encode entries for persistence. Non-empty output always ends in `\n`.
pub fn encode(entries: &[MemoryEntry]) -> String {
    let mut out = join(entries);
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Newline-joined entries without the trailing newline.
pub fn join(entries: &[MemoryEntry]) -> String {
    entries
        .iter()
        .map(MemoryEntry::content)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split caller-supplied text into new entries.
///
/// Trailing whitespace (including `\r`) is trimmed from each line; leading and
/// internal whitespace is preserved. Lines left empty are dropped.
pub fn split_input(text: &str) -> Vec<MemoryEntry> {
    text.split('\n')
        .map(str::trim_end)
        .filter(|line| !line.trim_start().is_empty())
        .map(MemoryEntry::from_line)
        .collect()
}
