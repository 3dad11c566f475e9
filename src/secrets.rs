//! Secret tracking, for emission-time redaction, and the per-load document
//! cache that lets repeated `!secret` lookups share one parse of `secrets.yaml`.

use crate::value::AnnotatedValue;
use std::collections::HashMap;
use std::path::PathBuf;

/// A per-load value->name map. Not global state: each `Loader` owns one (see
/// the design notes on why the original's process-wide singleton became an
/// explicit context object here).
#[derive(Debug, Default)]
pub struct SecretRegistry {
    value_to_name: HashMap<String, String>,
}

impl SecretRegistry {
    pub fn new() -> Self {
        SecretRegistry::default()
    }

    pub fn register(&mut self, value: impl Into<String>, name: impl Into<String>) {
        let value = value.into();
        let name = name.into();
        tracing::debug!(secret = %name, "registered secret");
        self.value_to_name.insert(value, name);
    }

    pub fn lookup(&self, value: &str) -> Option<&str> {
        self.value_to_name.get(value).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.value_to_name.clear();
    }
}

/// Per-load cache of parsed `secrets.yaml` documents, keyed by resolved path.
#[derive(Debug, Default)]
pub struct DocumentCache {
    secrets_files: HashMap<PathBuf, AnnotatedValue>,
}

impl DocumentCache {
    pub fn new() -> Self {
        DocumentCache::default()
    }

    pub fn get(&self, path: &PathBuf) -> Option<&AnnotatedValue> {
        self.secrets_files.get(path)
    }

    pub fn insert(&mut self, path: PathBuf, value: AnnotatedValue) {
        self.secrets_files.insert(path, value);
    }

    pub fn clear(&mut self) {
        self.secrets_files.clear();
    }
}
