//! Persisted display name
//!
//! A small JSON key-value file in the data directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CliError, Result};

const STORE_FILE: &str = "settings.json";
const USERNAME_KEY: &str = "username";

#[derive(Debug, Clone)]
pub struct UsernameStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl UsernameStore {
    /// Open the store in `dir`; a missing file is an empty store
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(STORE_FILE);
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            BTreeMap::new()
        };
        debug!("Opened settings store at {}", path.display());
        Ok(Self { path, entries })
    }

    pub fn username(&self) -> Option<&str> {
        self.entries.get(USERNAME_KEY).map(String::as_str)
    }

    /// Store a new display name and write it to disk
    pub fn set_username(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CliError::Config("Display name must not be empty".to_string()));
        }
        self.entries
            .insert(USERNAME_KEY.to_string(), name.to_string());
        self.save()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}
