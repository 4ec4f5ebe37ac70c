//! Named key-value store persisted as a single JSON document.
//!
//! Mutations stay in memory until `save` is called.

use crate::error::{Result, ShellError};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub struct LocalCache {
    identifier: String,
    document: PathBuf,
    cache: Map<String, Value>,
}

impl LocalCache {
    /// Open the store named `identifier` under `dir`, loading whatever was
    /// last saved. A missing or empty document yields an empty store.
    pub fn open(dir: &Path, identifier: &str) -> Result<Self> {
        if identifier.is_empty()
            || identifier.contains(['/', '\\'])
            || identifier.starts_with('.')
        {
            return Err(ShellError::Storage(format!(
                "Invalid storage identifier: {:?}",
                identifier
            )));
        }

        let document = dir.join(format!("{}.json", identifier));
        let cache = Self::load(&document)?;

        Ok(Self {
            identifier: identifier.to_string(),
            document,
            cache,
        })
    }

    fn load(document: &Path) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(document) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(ShellError::io(document, e)),
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            other => Err(ShellError::Storage(format!(
                "Expected a JSON object in {}, found {}",
                document.display(),
                type_name(&other)
            ))),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn document_path(&self) -> &Path {
        &self.document
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cache.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.cache.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.cache.remove(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Detached copy of every entry
    pub fn data(&self) -> Map<String, Value> {
        self.cache.clone()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.document.parent() {
            fs::create_dir_all(parent).map_err(|e| ShellError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.cache)?;
        fs::write(&self.document, json).map_err(|e| ShellError::io(&self.document, e))?;
        tracing::debug!(identifier = %self.identifier, entries = self.cache.len(), "Local cache saved");
        Ok(())
    }

    /// Drop every entry and delete the backing document.
    pub fn clear(&mut self) -> Result<()> {
        self.cache.clear();
        match fs::remove_file(&self.document) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ShellError::io(&self.document, e)),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
