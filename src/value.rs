//! The Annotated Value model: a parsed YAML value paired with origin metadata.

use crate::origin::Origin;
use indexmap::IndexMap;

/// A constructed value together with its source location and force-coercion flag.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedValue {
    pub kind: ValueKind,
    pub origin: Origin,
    /// Set by `!force`: downstream (schema-validation) coercions should be bypassed.
    /// Modeled as a flag rather than a wrapper variant so it composes with any scalar.
    pub force: bool,
}

/// The tagged union of constructible value shapes.
///
/// `SpreadSequence` is an internal marker produced only by `!for`; it is consumed
/// by the immediately enclosing sequence's flattening step and must never be
/// observed by code outside this crate (see `Constructor::construct`, which
/// degrades a `SpreadSequence` to a plain `Sequence` if it would otherwise escape).
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    Sequence(Vec<AnnotatedValue>),
    Mapping(IndexMap<String, AnnotatedValue>),
    OrderedMap(Vec<(String, AnnotatedValue)>),
    Lambda(String),
    SpreadSequence(Vec<AnnotatedValue>),
}

impl AnnotatedValue {
    pub fn new(kind: ValueKind, origin: Origin) -> Self {
        AnnotatedValue {
            kind,
            origin,
            force: false,
        }
    }

    pub fn null(origin: Origin) -> Self {
        AnnotatedValue::new(ValueKind::Null, origin)
    }

    pub fn string(s: impl Into<String>, origin: Origin) -> Self {
        AnnotatedValue::new(ValueKind::String(s.into()), origin)
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Degrades an internal `SpreadSequence` marker to a plain sequence. Any
    /// value returned across a public API boundary must pass through this.
    pub fn escape_spread(self) -> Self {
        match self.kind {
            ValueKind::SpreadSequence(items) => AnnotatedValue {
                kind: ValueKind::Sequence(items),
                origin: self.origin,
                force: self.force,
            },
            _ => self,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[AnnotatedValue]> {
        match &self.kind {
            ValueKind::Sequence(items) | ValueKind::SpreadSequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, AnnotatedValue>> {
        match &self.kind {
            ValueKind::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Python-style truthiness: everything is truthy except null, false, zero,
    /// empty string, and empty collections.
    pub fn is_truthy(&self) -> bool {
        match &self.kind {
            ValueKind::Null => false,
            ValueKind::Bool(b) => *b,
            ValueKind::Integer(i) => *i != 0,
            ValueKind::Float(f) => *f != 0.0,
            ValueKind::String(s) => !s.is_empty(),
            ValueKind::Binary(b) => !b.is_empty(),
            ValueKind::Sequence(items) | ValueKind::SpreadSequence(items) => !items.is_empty(),
            ValueKind::Mapping(map) => !map.is_empty(),
            ValueKind::OrderedMap(pairs) => !pairs.is_empty(),
            ValueKind::Lambda(_) => true,
        }
    }

    /// A scalar's plain-text representation, used for secret-registry lookups
    /// and for `!merge`'s identity-key comparison. `None` for non-scalar kinds.
    pub fn scalar_text(&self) -> Option<String> {
        match &self.kind {
            ValueKind::Null => Some(String::new()),
            ValueKind::Bool(b) => Some(b.to_string()),
            ValueKind::Integer(i) => Some(i.to_string()),
            ValueKind::Float(f) => Some(f.to_string()),
            ValueKind::String(s) => Some(s.clone()),
            ValueKind::Lambda(body) => Some(body.clone()),
            _ => None,
        }
    }
}
