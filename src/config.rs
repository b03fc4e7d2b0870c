//! Configuration loading for memlines.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default memory file name inside the home directory.
pub const MEMORY_FILE_NAME: &str = "memories.txt";

/// Get the memlines home directory (~/.memlines).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".memlines"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// memlines settings. Every field is optional on disk.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Settings {
    /// Where memories are persisted.
    #[serde(default)]
    pub memory_file: Option<PathBuf>,

    /// Debug-level logging.
    #[serde(default)]
    pub verbose: bool,
}

impl Settings {
    /// Memory file, falling back to ~/.memlines/memories.txt.
    pub fn memory_file(&self) -> Result<PathBuf> {
        match &self.memory_file {
            Some(path) => Ok(path.clone()),
            None => Ok(get_home_dir()?.join(MEMORY_FILE_NAME)),
        }
    }
}

/// Load settings from ~/.memlines/settings.json, defaulting when absent.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load settings from an explicit path. A missing file yields defaults;
/// a malformed one is an error.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Invalid settings file {}: {}", path.display(), e))
    })?;

    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if let Some(path) = &settings.memory_file {
        if path.as_os_str().is_empty() {
            return Err(Error::Config("memory_file must not be empty".to_string()));
        }
    }
    Ok(())
}

/// Command-line / environment overrides, highest precedence.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub memory_file: Option<PathBuf>,
    pub verbose: bool,
}

impl Overrides {
    pub fn apply(self, mut settings: Settings) -> Settings {
        if let Some(path) = self.memory_file {
            settings.memory_file = Some(path);
        }
        settings.verbose |= self.verbose;
        settings
    }
}
