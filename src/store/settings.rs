//! JSON settings document
//!
//! The document is a flat object of categories, each mapping setting names to
//! values:
//!
//! ```json
//! {
//!   "server_settings": { "host": "10.0.0.5", "port": "32400" },
//!   "force_matches": { "48213": "EP012345670003" },
//!   "force_unmatches": {}
//! }
//! ```
//!
//! Every mutation goes through [`SettingsStore::edit`], which reads the file
//! fresh, applies the change, replaces the file atomically and re-reads it. The
//! in-memory copy handed back is always what is on disk.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Category holding connection settings
pub const SERVER_SETTINGS: &str = "server_settings";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file {path} is not a valid settings document: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize settings for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// In-memory copy of the settings document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsDocument {
    categories: BTreeMap<String, BTreeMap<String, Value>>,
}

impl SettingsDocument {
    /// Get a setting as a string. Numbers and booleans are rendered as text.
    pub fn get(&self, category: &str, name: &str) -> Option<String> {
        scalar_text(self.categories.get(category)?.get(name)?)
    }

    /// Add or replace a setting, creating the category if needed
    pub fn set(&mut self, category: &str, name: &str, value: impl Into<String>) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(name.to_string(), Value::String(value.into()));
    }

    /// Remove a setting, returning its previous value
    pub fn remove(&mut self, category: &str, name: &str) -> Option<String> {
        let previous = self.get(category, name);
        self.categories.get_mut(category)?.remove(name);
        previous
    }

    /// All settings of one category as strings, in key order
    pub fn category(&self, category: &str) -> Vec<(String, String)> {
        let Some(entries) = self.categories.get(category) else {
            return Vec::new();
        };
        entries
            .keys()
            .filter_map(|name| self.get(category, name).map(|value| (name.clone(), value)))
            .collect()
    }

    /// All settings of one category as lists. A single value reads as a
    /// one-element list; array items that are not scalars are skipped.
    pub fn category_lists(&self, category: &str) -> Vec<(String, Vec<String>)> {
        let Some(entries) = self.categories.get(category) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|(name, value)| {
                let values = match value {
                    Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
                    other => vec![scalar_text(other)?],
                };
                Some((name.clone(), values))
            })
            .collect()
    }

    /// Replace a whole category. A list with one value is stored as a plain
    /// string, longer lists as arrays, and empty lists are dropped.
    pub fn replace_category(
        &mut self,
        category: &str,
        entries: impl IntoIterator<Item = (String, Vec<String>)>,
    ) {
        let values = entries
            .into_iter()
            .filter_map(|(name, mut list)| {
                let value = match list.len() {
                    0 => return None,
                    1 => Value::String(list.remove(0)),
                    _ => Value::Array(list.into_iter().map(Value::String).collect()),
                };
                Some((name, value))
            })
            .collect();
        self.categories.insert(category.to_string(), values);
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// File-backed settings document
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document from disk. A missing file reads as an empty document.
    pub fn load(&self) -> Result<SettingsDocument, SettingsError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SettingsDocument::default()),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(SettingsDocument::default());
        }

        serde_json::from_slice(&bytes).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Mutate the document.
    ///
    /// The closure sees a freshly loaded document. If it fails nothing is
    /// written. Otherwise the full document is written to a temporary sibling
    /// file, renamed over the original, and read back; the re-read document is
    /// returned alongside the closure's value.
    pub fn edit<T, E, F>(&self, f: F) -> Result<(T, SettingsDocument), E>
    where
        F: FnOnce(&mut SettingsDocument) -> Result<T, E>,
        E: From<SettingsError>,
    {
        let mut document = self.load()?;
        let value = f(&mut document)?;
        self.write(&document)?;
        let reloaded = self.load()?;
        debug!(path = %self.path.display(), "Settings document rewritten");
        Ok((value, reloaded))
    }

    /// Set one value
    pub fn set(&self, category: &str, name: &str, value: &str) -> Result<SettingsDocument, SettingsError> {
        let ((), document) = self.edit(|doc| {
            doc.set(category, name, value);
            Ok::<_, SettingsError>(())
        })?;
        Ok(document)
    }

    /// Remove one value
    pub fn remove(&self, category: &str, name: &str) -> Result<Option<String>, SettingsError> {
        let (previous, _) = self.edit(|doc| Ok::<_, SettingsError>(doc.remove(category, name)))?;
        Ok(previous)
    }

    fn write(&self, document: &SettingsDocument) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let bytes = serde_json::to_vec_pretty(document).map_err(|source| SettingsError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes).map_err(write_err)?;
        fs::rename(&tmp_path, &self.path).map_err(write_err)?;
        Ok(())
    }
}
