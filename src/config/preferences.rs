//! Persisted key/value settings
//!
//! A small JSON-backed store holding booleans and strings. Reads come from
//! memory; edits are staged on an [`Editor`] and published together.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    String(String),
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    values: Mutex<BTreeMap<String, PrefValue>>,
}

/// Shared handle to the preferences store
#[derive(Debug, Clone)]
pub struct Preferences {
    inner: Arc<Inner>,
}

impl Preferences {
    /// Open the store at `path`
    ///
    /// A missing file yields an empty store. A corrupt one is logged and
    /// also treated as empty; the next write replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Preferences file is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No preferences file yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read preferences, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            inner: Arc::new(Inner {
                path,
                values: Mutex::new(values),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, PrefValue>> {
        // A panic while holding the lock cannot leave the map half-written
        self.inner
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Boolean value for `key`, or `default` if absent or not a boolean
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values().get(key) {
            Some(PrefValue::Bool(b)) => *b,
            _ => default,
        }
    }

    /// String value for `key`, or `default` if absent or not a string
    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.values().get(key) {
            Some(PrefValue::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values().contains_key(key)
    }

    pub fn edit(&self) -> Editor {
        Editor {
            prefs: self.clone(),
            changes: Vec::new(),
        }
    }

    /// Write the current in-memory values to disk
    pub fn flush(&self) -> Result<()> {
        let values = self.values();
        self.write(&values)
    }

    fn write(&self, values: &BTreeMap<String, PrefValue>) -> Result<()> {
        let path = &self.inner.path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create preferences directory {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(values)
            .context("Failed to serialize preferences to JSON")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write preferences to {:?}", path))?;

        debug!(path = %path.display(), count = values.len(), "Saved preferences");
        Ok(())
    }

    fn publish(&self, changes: Vec<(String, Option<PrefValue>)>) -> Result<()> {
        let mut values = self.values();
        for (key, value) in changes {
            match value {
                Some(value) => values.insert(key, value),
                None => values.remove(&key),
            };
        }
        self.write(&values)
    }
}

/// Staged set of changes to a [`Preferences`] store
#[must_use = "changes are only published by apply() or commit()"]
pub struct Editor {
    prefs: Preferences,
    changes: Vec<(String, Option<PrefValue>)>,
}

impl Editor {
    pub fn put_bool(mut self, key: &str, value: bool) -> Self {
        self.changes.push((key.to_string(), Some(PrefValue::Bool(value))));
        self
    }

    pub fn put_string(mut self, key: &str, value: impl Into<String>) -> Self {
        self.changes
            .push((key.to_string(), Some(PrefValue::String(value.into()))));
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.changes.push((key.to_string(), None));
        self
    }

    /// Publish the changes; a failed write is logged, not returned
    ///
    /// In-memory values are updated even when persisting fails.
    pub fn apply(self) {
        let path = self.prefs.path().to_path_buf();
        if let Err(e) = self.prefs.publish(self.changes) {
            error!(path = %path.display(), error = ?e, "Failed to persist preferences");
        }
    }

    /// Publish the changes and report whether they reached disk
    pub fn commit(self) -> Result<()> {
        let count = self.changes.len();
        self.prefs.publish(self.changes)?;
        info!(count, "Committed preference changes");
        Ok(())
    }
}
