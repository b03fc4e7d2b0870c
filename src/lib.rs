//! memlines library root.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod memory;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use error::{Error, Result};
pub use mcp::MemoryServer;
pub use memory::{FileStorage, InMemoryStorage, MemoryEntry, MemoryStore, Storage};
