//! Parser for the framework's `key=value` property file

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::{self, BufRead, Read};

use crate::constants::props as keys;

/// Ordered string → string mapping read from the property file
///
/// Keys keep the position of their first occurrence; a later duplicate
/// only replaces the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    entries: Vec<(String, String)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Installed framework version string
    pub fn version(&self) -> Option<&str> {
        self.get(keys::VERSION)
    }

    /// CPU architecture the framework was built for
    pub fn arch(&self) -> Option<&str> {
        self.get(keys::ARCH)
    }

    /// Lowest supported SDK level, if present and numeric
    pub fn min_sdk(&self) -> Option<u32> {
        self.get(keys::MIN_SDK).and_then(|v| v.parse().ok())
    }

    /// Highest supported SDK level, if present and numeric
    pub fn max_sdk(&self) -> Option<u32> {
        self.get(keys::MAX_SDK).and_then(|v| v.parse().ok())
    }
}

impl Serialize for PropertyMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Parse a property stream into a [`PropertyMap`]
///
/// Lines without `=` are dropped, as are lines whose key starts with `#`.
/// Only read errors are reported; malformed lines never fail the parse.
pub fn parse_properties<R: BufRead>(mut reader: R) -> io::Result<PropertyMap> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    // The file is not guaranteed to be clean UTF-8
    let text = String::from_utf8_lossy(&bytes);

    let mut map = PropertyMap::new();
    // `\n`, `\r` and `\r\n` all end a line; the empty piece between `\r\n`
    // has no separator and is skipped like any blank line
    for line in text.split(['\r', '\n']) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if key.starts_with('#') {
            continue;
        }

        map.insert(key.to_string(), value.trim().to_string());
    }
    Ok(map)
}
