//! Memory system - newline-delimited entries with file persistence.

pub mod codec;
pub mod lock;
pub mod storage;
pub mod store;

pub use codec::MemoryEntry;
pub use storage::{FileStorage, InMemoryStorage, Storage};
pub use store::{AppendOutcome, DeleteOutcome, Listing, MemoryStore, SearchHits};
