//! The scoped variable environment consulted by the Expander.

use crate::value::AnnotatedValue;
use indexmap::IndexMap;

/// An ordered map from variable name to value. Environments compose by
/// shallow copy-on-extend: `child()` clones the current bindings into a new
/// environment whose mutations never affect `self`; the caller restores the
/// parent by simply discarding the child and resuming the saved value.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: IndexMap<String, AnnotatedValue>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn get(&self, name: &str) -> Option<&AnnotatedValue> {
        self.vars.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: AnnotatedValue) {
        self.vars.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnnotatedValue)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// A shallow copy whose subsequent mutations do not affect `self`.
    pub fn child(&self) -> Environment {
        self.clone()
    }

    /// `self` overridden by every binding in `overrides` (overrides win).
    pub fn extended_with(&self, overrides: &Environment) -> Environment {
        let mut result = self.clone();
        for (k, v) in overrides.iter() {
            result.insert(k.to_string(), v.clone());
        }
        result
    }
}
