//! The Construction Pass: walks a `RawNode` tree, dispatching by tag, building
//! `AnnotatedValue`s, enforcing duplicate-key and merge-key semantics, and
//! consulting the Expander for scalar strings.

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::expander;
use crate::loader::Loader;
use crate::origin::Origin;
use crate::raw::{RawKind, RawNode};
use crate::value::{AnnotatedValue, ValueKind};
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use yaml_rust2::scanner::TScalarStyle;

const MERGE_KEY: &str = "<<";

pub(crate) struct Constructor<'a> {
    pub loader: &'a mut Loader,
    pub env: Environment,
    pub disable_str_expansion: bool,
    pub current_dir: PathBuf,
    pub current_file: Option<Arc<std::path::Path>>,
}

impl<'a> Constructor<'a> {
    pub fn new(
        loader: &'a mut Loader,
        env: Environment,
        current_dir: PathBuf,
        current_file: Option<Arc<std::path::Path>>,
    ) -> Self {
        Constructor {
            loader,
            env,
            disable_str_expansion: false,
            current_dir,
            current_file,
        }
    }

    /// Dispatches by tag, then stamps the result with `node`'s own origin so
    /// every production (directive or standard) carries the location of the
    /// node that produced it, not a location borrowed from elsewhere.
    pub fn construct(&mut self, node: &RawNode) -> Result<AnnotatedValue> {
        let mut value = if let Some(tag) = node.directive_tag() {
            match crate::directives::dispatch(tag) {
                Some(handler) => handler(self, node)?,
                None => {
                    return Err(Error::parse(
                        format!("unknown tag !{tag}"),
                        Some(node.origin.clone()),
                    ))
                }
            }
        } else {
            self.construct_standard(node)?
        };
        value.origin = node.origin.clone();
        Ok(value)
    }

    /// Constructs ignoring any directive tag on `node` — used as the default
    /// path for untagged nodes, and by `!literal`/`!merge` which consume their
    /// own tag and fall back to standard scalar/sequence/mapping handling.
    pub fn construct_standard(&mut self, node: &RawNode) -> Result<AnnotatedValue> {
        match &node.kind {
            RawKind::Scalar { text, style } => self.construct_scalar(node, text, *style),
            RawKind::Sequence(items) => {
                if node.standard_tag() == Some("omap") {
                    self.construct_omap_sequence(items)
                } else {
                    self.construct_sequence(items)
                }
            }
            RawKind::Mapping(entries) => self.construct_mapping(node, entries),
        }
    }

    fn construct_scalar(
        &mut self,
        node: &RawNode,
        text: &str,
        style: TScalarStyle,
    ) -> Result<AnnotatedValue> {
        if let Some(tag) = node.standard_tag() {
            match tag {
                "binary" => {
                    let bytes = base64::Engine::decode(
                        &base64::engine::general_purpose::STANDARD,
                        text.trim(),
                    )
                    .map_err(|e| {
                        Error::parse(
                            format!("invalid !!binary payload: {e}"),
                            Some(node.origin.clone()),
                        )
                    })?;
                    return Ok(AnnotatedValue::new(ValueKind::Binary(bytes), node.origin.clone()));
                }
                "str" => {
                    return self.construct_string(node, text);
                }
                "int" => {
                    let i: i64 = text.trim().parse().map_err(|_| {
                        Error::parse(format!("invalid integer {text:?}"), Some(node.origin.clone()))
                    })?;
                    return Ok(AnnotatedValue::new(ValueKind::Integer(i), node.origin.clone()));
                }
                "float" => {
                    let f: f64 = text.trim().parse().map_err(|_| {
                        Error::parse(format!("invalid float {text:?}"), Some(node.origin.clone()))
                    })?;
                    return Ok(AnnotatedValue::new(ValueKind::Float(f), node.origin.clone()));
                }
                _ => {}
            }
        }

        if style == TScalarStyle::Plain {
            if let Some(kind) = scalar_plain_kind(text) {
                return Ok(AnnotatedValue::new(kind, node.origin.clone()));
            }
        }
        self.construct_string(node, text)
    }

    pub(crate) fn construct_string(&mut self, node: &RawNode, text: &str) -> Result<AnnotatedValue> {
        if self.disable_str_expansion {
            return Ok(AnnotatedValue::string(text, node.origin.clone()));
        }
        let expanded = expander::expand(text, &self.env)
            .map_err(|e| Error::from_expand(e, Some(node.origin.clone())))?;
        Ok(AnnotatedValue::string(expanded, node.origin.clone()))
    }

    fn construct_sequence(&mut self, items: &[RawNode]) -> Result<AnnotatedValue> {
        let mut result = Vec::with_capacity(items.len());
        for item in items {
            let value = self.construct(item)?;
            match value.kind {
                ValueKind::SpreadSequence(spread) => {
                    for v in spread {
                        if v.kind != ValueKind::Null {
                            result.push(v);
                        }
                    }
                }
                ValueKind::Null => {}
                _ => result.push(value),
            }
        }
        Ok(AnnotatedValue::new(
            ValueKind::Sequence(result),
            Origin::synthetic(),
        ))
    }

    fn construct_mapping(
        &mut self,
        node: &RawNode,
        entries: &[(RawNode, RawNode)],
    ) -> Result<AnnotatedValue> {
        if let Some(om) = self.try_construct_omap(node, entries)? {
            return Ok(om);
        }

        let mut direct: Vec<(String, Origin, AnnotatedValue)> = Vec::new();
        let mut merge_pairs: Vec<(String, Origin, AnnotatedValue)> = Vec::new();
        let mut seen: IndexMap<String, Origin> = IndexMap::new();

        for (key_node, value_node) in entries {
            let key_text = self.construct_key(key_node)?;
            if key_text == MERGE_KEY {
                for (k, origin, v) in self.construct_merge_value(value_node)? {
                    merge_pairs.push((k, origin, v));
                }
                continue;
            }
            if let Some(prior) = seen.get(&key_text) {
                return Err(Error::DuplicateKey {
                    key: key_text,
                    first: prior.clone(),
                    second: key_node.origin.clone(),
                });
            }
            // A mapping value is a terminal, non-flattening position: a
            // `!for` written directly as a mapping value (not inside a
            // sequence) has nothing to flatten it, so degrade it here the
            // same way the document root does.
            let value = self.construct(value_node)?.escape_spread();
            seen.insert(key_text.clone(), key_node.origin.clone());
            direct.push((key_text, key_node.origin.clone(), value));
        }

        let mut result = IndexMap::new();
        for (key, _, value) in direct {
            result.insert(key, value);
        }
        for (key, origin, value) in merge_pairs {
            if result.contains_key(&key) {
                continue;
            }
            if seen.contains_key(&key) {
                continue;
            }
            seen.insert(key.clone(), origin);
            result.insert(key, value);
        }

        Ok(AnnotatedValue::new(
            ValueKind::Mapping(result),
            Origin::synthetic(),
        ))
    }

    fn construct_key(&mut self, node: &RawNode) -> Result<String> {
        let prev = self.disable_str_expansion;
        self.disable_str_expansion = true;
        let value = self.construct(node);
        self.disable_str_expansion = prev;
        let value = value?;
        value.scalar_text().ok_or_else(|| {
            Error::type_error("mapping keys must be scalars", Some(node.origin.clone()))
        })
    }

    /// Constructs the value of a `<<` entry into an ordered list of
    /// candidate (key, origin, value) triples: a mapping contributes its own
    /// entries, a sequence of mappings contributes them with earlier entries
    /// taking precedence over later ones.
    fn construct_merge_value(
        &mut self,
        node: &RawNode,
    ) -> Result<Vec<(String, Origin, AnnotatedValue)>> {
        match &node.kind {
            RawKind::Mapping(_) => {
                let constructed = self.construct(node)?;
                Ok(mapping_to_pairs(constructed))
            }
            RawKind::Sequence(items) => {
                let mut seen = IndexMap::new();
                let mut ordered = Vec::new();
                for item in items {
                    if !matches!(item.kind, RawKind::Mapping(_)) {
                        return Err(Error::type_error(
                            "merge key sequence entries must be mappings",
                            Some(item.origin.clone()),
                        ));
                    }
                    let constructed = self.construct(item)?;
                    for (key, origin, value) in mapping_to_pairs(constructed) {
                        if seen.contains_key(&key) {
                            continue;
                        }
                        seen.insert(key.clone(), ());
                        ordered.push((key, origin, value));
                    }
                }
                Ok(ordered)
            }
            _ => Err(Error::type_error(
                "merge key value must be a mapping or sequence of mappings",
                Some(node.origin.clone()),
            )),
        }
    }

    fn try_construct_omap(
        &mut self,
        node: &RawNode,
        _entries: &[(RawNode, RawNode)],
    ) -> Result<Option<AnnotatedValue>> {
        if node.standard_tag() != Some("omap") {
            return Ok(None);
        }
        Err(Error::type_error(
            "!!omap must be written as a sequence of single-key mappings",
            Some(node.origin.clone()),
        ))
    }

    /// Handles the sequence form of `!!omap`: `!!omap [{k: v}, ...]`.
    pub fn construct_omap_sequence(&mut self, items: &[RawNode]) -> Result<AnnotatedValue> {
        let mut pairs = Vec::with_capacity(items.len());
        let mut seen: IndexMap<String, Origin> = IndexMap::new();
        for item in items {
            let entries = match &item.kind {
                RawKind::Mapping(entries) if entries.len() == 1 => entries,
                _ => {
                    return Err(Error::type_error(
                        "!!omap entries must be single-key mappings",
                        Some(item.origin.clone()),
                    ))
                }
            };
            let (key_node, value_node) = &entries[0];
            let key_text = self.construct_key(key_node)?;
            if let Some(prior) = seen.get(&key_text) {
                return Err(Error::DuplicateKey {
                    key: key_text,
                    first: prior.clone(),
                    second: key_node.origin.clone(),
                });
            }
            let value = self.construct(value_node)?.escape_spread();
            seen.insert(key_text.clone(), key_node.origin.clone());
            pairs.push((key_text, value));
        }
        Ok(AnnotatedValue::new(
            ValueKind::OrderedMap(pairs),
            Origin::synthetic(),
        ))
    }
}

fn mapping_to_pairs(value: AnnotatedValue) -> Vec<(String, Origin, AnnotatedValue)> {
    match value.kind {
        ValueKind::Mapping(map) => map
            .into_iter()
            .map(|(k, v)| {
                let origin = v.origin.clone();
                (k, origin, v)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn scalar_plain_kind(text: &str) -> Option<ValueKind> {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => Some(ValueKind::Null),
        "true" | "True" | "TRUE" => Some(ValueKind::Bool(true)),
        "false" | "False" | "FALSE" => Some(ValueKind::Bool(false)),
        ".nan" | ".NaN" | ".NAN" => Some(ValueKind::Float(f64::NAN)),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            Some(ValueKind::Float(f64::INFINITY))
        }
        "-.inf" | "-.Inf" | "-.INF" => Some(ValueKind::Float(f64::NEG_INFINITY)),
        _ => {
            if let Ok(i) = text.parse::<i64>() {
                Some(ValueKind::Integer(i))
            } else if looks_like_float(text) {
                text.parse::<f64>().ok().map(ValueKind::Float)
            } else {
                None
            }
        }
    }
}

fn looks_like_float(text: &str) -> bool {
    let mut has_digit = false;
    let mut has_dot_or_exp = false;
    for (i, c) in text.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => has_digit = true,
            '.' | 'e' | 'E' => has_dot_or_exp = true,
            _ => return false,
        }
    }
    has_digit && has_dot_or_exp
}
