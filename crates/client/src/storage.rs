//! Persistent key/value storage.
//!
//! JSON files in the platform-appropriate config directory:
//!   - Linux: `~/.config/bidlink/`
//!   - macOS: `~/Library/Application Support/bidlink/`
//!   - Windows: `%APPDATA%\bidlink\`

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ClientError, Result};

/// A directory of `<key>.json` files.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store in the user's config directory.
    pub fn user_config() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ClientError::Storage("no config directory on this platform".to_string()))?;
        Ok(Self::at(config_dir.join("bidlink")))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a value to persistent storage.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).map_err(|e| ClientError::Storage(e.to_string()))?;
        std::fs::create_dir_all(&self.dir).map_err(|e| ClientError::Storage(e.to_string()))?;
        std::fs::write(self.file_path(key), json).map_err(|e| ClientError::Storage(e.to_string()))
    }

    /// Load a value from persistent storage.
    ///
    /// Returns `None` if the key doesn't exist or deserialization fails.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = std::fs::read_to_string(self.file_path(key)).ok()?;
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring unreadable stored value");
                None
            }
        }
    }

    /// Remove a value from persistent storage. Removing a missing key is not an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.file_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(e.to_string())),
        }
    }

    /// Check if a key exists in storage.
    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).is_file()
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}
