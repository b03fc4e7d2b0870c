//! Memory store - append, list, search and delete over persisted lines.
//!
//! The store keeps no state between calls. Each operation reads the
//! current collection from its [`Storage`], and mutations write the whole
//! collection back while holding the storage lock.

use serde::Serialize;

use crate::error::{Error, Result};

use super::codec::{self, MemoryEntry};
use super::storage::Storage;

/// Result of an append.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    pub added: usize,
    pub total: usize,
}

impl std::fmt::Display for AppendOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Added {} {} ({} total)",
            self.added,
            plural(self.added),
            self.total
        )
    }
}

/// Full collection, or an explicit empty marker.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "state", content = "entries", rename_all = "lowercase")]
pub enum Listing {
    Empty,
    Entries(Vec<MemoryEntry>),
}

impl Listing {
    fn from_entries(entries: Vec<MemoryEntry>) -> Self {
        if entries.is_empty() {
            Listing::Empty
        } else {
            Listing::Entries(entries)
        }
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        match self {
            Listing::Empty => &[],
            Listing::Entries(entries) => entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Listing::Empty)
    }
}

impl std::fmt::Display for Listing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Listing::Empty => write!(f, "No memories stored."),
            Listing::Entries(entries) => f.write_str(&codec::join(entries)),
        }
    }
}

/// Entries matching a search, in collection order.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SearchHits {
    pub query: String,
    pub entries: Vec<MemoryEntry>,
}

impl std::fmt::Display for SearchHits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.entries.is_empty() {
            write!(f, "No memories contain '{}'.", self.query)
        } else {
            f.write_str(&codec::join(&self.entries))
        }
    }
}

/// Result of a delete.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub removed: usize,
    pub remaining: usize,
}

impl std::fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.removed == 0 {
            write!(f, "No entries matched; nothing deleted")
        } else {
            write!(
                f,
                "Deleted {} {} ({} remaining)",
                self.removed,
                plural(self.removed),
                self.remaining
            )
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "memory"
    } else {
        "memories"
    }
}

/// Reject a missing or blank required argument before any I/O happens.
fn require<'a>(value: &'a str, message: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(Error::InvalidArgument(message.to_string()));
    }
    Ok(value)
}

pub const TEXT_REQUIRED: &str = "Memory's text is required";
pub const QUERY_REQUIRED: &str = "query is required";

/// Memory operations over an injected storage handle.
#[derive(Debug)]
pub struct MemoryStore<S> {
    storage: S,
}

impl<S: Storage> MemoryStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn load(&self) -> Result<Vec<MemoryEntry>> {
        match self.storage.read()? {
            Some(raw) => codec::decode(&raw),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, entries: &[MemoryEntry]) -> Result<()> {
        self.storage.write(codec::encode(entries).as_bytes())
    }

    /// Append one entry per non-blank line of `text`.
    pub fn append(&self, text: &str) -> Result<AppendOutcome> {
        let text = require(text, TEXT_REQUIRED)?;
        let new_entries = codec::split_input(text);
        if new_entries.is_empty() {
            return Err(Error::InvalidArgument(TEXT_REQUIRED.to_string()));
        }

        let _lock = self.storage.lock()?;
        let mut entries = self.load()?;
        let added = new_entries.len();
        entries.extend(new_entries);
        self.save(&entries)?;

        tracing::debug!(
            "Appended {} entries to {} ({} total)",
            added,
            self.storage.describe(),
            entries.len()
        );
        Ok(AppendOutcome {
            added,
            total: entries.len(),
        })
    }

    /// All entries, in insertion order.
    pub fn list(&self) -> Result<Listing> {
        let entries = self.load()?;
        tracing::debug!("Listed {} entries", entries.len());
        Ok(Listing::from_entries(entries))
    }

    /// Entries whose content contains `query`, case-sensitive.
    pub fn search(&self, query: &str) -> Result<SearchHits> {
        let query = require(query, QUERY_REQUIRED)?;
        let entries: Vec<MemoryEntry> = self
            .load()?
            .into_iter()
            .filter(|e| e.matches(query))
            .collect();

        tracing::debug!("Search matched {} entries", entries.len());
        Ok(SearchHits {
            query: query.to_string(),
            entries,
        })
    }

    /// Remove every entry whose content contains `query`.
    pub fn delete(&self, query: &str) -> Result<DeleteOutcome> {
        let query = require(query, QUERY_REQUIRED)?;

        let _lock = self.storage.lock()?;
        let mut entries = self.load()?;
        let before = entries.len();
        entries.retain(|e| !e.matches(query));
        let removed = before - entries.len();

        if removed > 0 {
            self.save(&entries)?;
        }

        tracing::debug!(
            "Deleted {} entries from {} ({} remaining)",
            removed,
            self.storage.describe(),
            entries.len()
        );
        Ok(DeleteOutcome {
            removed,
            remaining: entries.len(),
        })
    }

    /// Raw newline-joined text of every entry; empty when nothing is stored.
    pub fn snapshot(&self) -> Result<String> {
        Ok(codec::join(&self.load()?))
    }
}
