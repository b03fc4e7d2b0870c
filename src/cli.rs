//! CLI commands for memlines using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{load_settings, Overrides, Settings};
use crate::mcp::MemoryServer;
use crate::memory::codec;
use crate::memory::{FileStorage, MemoryEntry, MemoryStore};

/// memlines - newline-delimited memories for tool-calling agents.
#[derive(Parser, Debug)]
#[command(name = "memlines")]
#[command(version)]
#[command(about = "memlines - a line-oriented memory store served over MCP stdio", long_about = None)]
pub struct Commands {
    /// Memory file (overrides settings.json)
    #[arg(long = "file", global = true, env = "MEMLINES_FILE")]
    pub file: Option<PathBuf>,

    /// Debug-level logging on stderr and in the log file
    #[arg(long, short, global = true, env = "MEMLINES_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the MCP server on stdin/stdout
    Serve,

    /// Add memory line(s); newlines separate entries
    Append {
        /// Text to remember
        text: String,
    },

    /// List all memories
    List,

    /// Show memories containing the query (case-sensitive)
    Search {
        /// Substring to look for
        query: String,
    },

    /// Delete every memory containing the query (case-sensitive)
    Delete {
        /// Substring to match
        query: String,
    },

    /// Print the resolved memory file path
    Path,
}

impl Commands {
    fn overrides(&self) -> Overrides {
        Overrides {
            memory_file: self.file.clone(),
            verbose: self.verbose,
        }
    }

    /// Settings after applying CLI and environment overrides.
    pub fn settings(&self) -> Result<Settings> {
        Ok(self.overrides().apply(load_settings()?))
    }

    /// Run the command against the resolved settings.
    pub async fn run(&self, settings: &Settings) -> Result<()> {
        let path = settings.memory_file()?;
        let store = MemoryStore::new(FileStorage::new(&path));

        match &self.command {
            Command::Serve => {
                MemoryServer::new(store).serve_stdio().await?;
            }
            Command::Append { text } => {
                println!("{}", store.append(text)?);
            }
            // stdout carries entry lines only; empty-state notices go to stderr.
            Command::List => {
                let listing = store.list()?;
                print_entries(listing.entries(), &listing);
            }
            Command::Search { query } => {
                let hits = store.search(query)?;
                print_entries(&hits.entries, &hits);
            }
            Command::Delete { query } => {
                println!("{}", store.delete(query)?);
            }
            Command::Path => {
                println!("{}", path.display());
            }
        }
        Ok(())
    }
}

fn print_entries(entries: &[MemoryEntry], notice: &dyn std::fmt::Display) {
    if entries.is_empty() {
        eprintln!("{}", notice);
    } else {
        println!("{}", codec::join(entries));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Commands::command().debug_assert();
    }

    #[test]
    fn test_parse_global_file_after_subcommand() {
        let args = Commands::try_parse_from([
            "memlines",
            "search",
            "tea",
            "--file",
            "/tmp/m.txt",
        ])
        .unwrap();
        assert_eq!(args.file, Some(PathBuf::from("/tmp/m.txt")));
        assert_eq!(
            args.command,
            Command::Search {
                query: "tea".to_string()
            }
        );
    }

    #[test]
    fn test_append_requires_text() {
        assert!(Commands::try_parse_from(["memlines", "append"]).is_err());
    }

    #[tokio::test]
    async fn test_run_against_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memories.txt");
        let settings = Settings {
            memory_file: Some(path.clone()),
            verbose: false,
        };

        let append = Commands::try_parse_from(["memlines", "append", "one\ntwo"]).unwrap();
        append.run(&settings).await.unwrap();

        let delete = Commands::try_parse_from(["memlines", "delete", "one"]).unwrap();
        delete.run(&settings).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two\n");
    }

    #[tokio::test]
    async fn test_run_rejects_blank_query() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings {
            memory_file: Some(temp_dir.path().join("memories.txt")),
            verbose: false,
        };

        let search = Commands::try_parse_from(["memlines", "search", " "]).unwrap();
        let err = search.run(&settings).await.unwrap_err();
        assert_eq!(err.to_string(), "query is required");
    }
}
