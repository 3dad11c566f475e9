//! One handler per custom tag, dispatched from a tag-string table as the
//! design notes prescribe (no inheritance, a plain `match`). Each handler
//! receives the `Constructor` driving the current document and the raw node
//! carrying the directive's own tag, and returns the constructed value;
//! `Constructor::construct` stamps the result with the node's origin
//! afterwards, so handlers need not do that themselves.

use crate::constructor::Constructor;
use crate::error::{Error, Result};
use crate::loader::GitFetchSpec;
use crate::raw::{RawKind, RawNode};
use crate::value::{AnnotatedValue, ValueKind};
use indexmap::IndexMap;
use std::path::PathBuf;

type Handler = fn(&mut Constructor, &RawNode) -> Result<AnnotatedValue>;

pub(crate) fn dispatch(tag: &str) -> Option<Handler> {
    match tag {
        "env_var" => Some(env_var),
        "secret" => Some(secret),
        "include" => Some(include_),
        "literal" => Some(literal),
        "for" => Some(for_),
        "if" => Some(if_),
        "merge" => Some(merge),
        "include_dir_list" => Some(include_dir_list),
        "include_dir_merge_list" => Some(include_dir_merge_list),
        "include_dir_named" => Some(include_dir_named),
        "include_dir_merge_named" => Some(include_dir_merge_named),
        "lambda" => Some(lambda),
        "force" => Some(force),
        _ => None,
    }
}

fn scalar_text(node: &RawNode) -> Result<&str> {
    match &node.kind {
        RawKind::Scalar { text, .. } => Ok(text),
        _ => Err(Error::type_error(
            "expected a scalar value",
            Some(node.origin.clone()),
        )),
    }
}

fn env_var(_ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let text = scalar_text(node)?;
    let mut parts = text.split_whitespace();
    let name = parts.next().ok_or_else(|| {
        Error::missing_field("!env_var requires a variable name", Some(node.origin.clone()))
    })?;
    let default_tail: Vec<&str> = parts.collect();
    if !default_tail.is_empty() {
        let value = std::env::var(name).unwrap_or_else(|_| default_tail.join(" "));
        return Ok(AnnotatedValue::string(value, node.origin.clone()));
    }
    match std::env::var(name) {
        Ok(value) => Ok(AnnotatedValue::string(value, node.origin.clone())),
        Err(_) => Err(Error::name_lookup(
            format!("environment variable '{name}' not defined"),
            Some(node.origin.clone()),
        )),
    }
}

fn secret(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let name = scalar_text(node)?.trim().to_string();
    let dir = ctor.current_dir.clone();
    let env = ctor.env.child();
    let secrets_doc = ctor.loader.load_secrets_file(&dir, env)?;
    let map = secrets_doc.as_mapping().ok_or_else(|| {
        Error::type_error("secrets.yaml must be a mapping", Some(node.origin.clone()))
    })?;
    let value = map.get(&name).cloned().ok_or_else(|| {
        Error::name_lookup(format!("Secret '{name}' not defined"), Some(node.origin.clone()))
    })?;
    if let Some(text) = value.scalar_text() {
        ctor.loader.secrets.register(text, name);
    }
    Ok(value)
}

fn optional_string_field(
    ctor: &mut Constructor,
    node: &RawNode,
    key: &str,
) -> Result<Option<String>> {
    match node.find_mapping_value(key) {
        Some(n) => {
            let value = ctor.construct(n)?;
            let text = value.as_str().ok_or_else(|| {
                Error::type_error(format!("'{key}' must be a string"), Some(n.origin.clone()))
            })?;
            Ok(Some(text.to_string()))
        }
        None => Ok(None),
    }
}

fn include_(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let (file_text, url, username, password, git_ref, refresh, vars_node) = match &node.kind {
        RawKind::Mapping(_) => {
            let file_node = node.find_mapping_value("file").ok_or_else(|| {
                Error::missing_field("!include requires 'file'", Some(node.origin.clone()))
            })?;
            let file_value = ctor.construct(file_node)?;
            let file_text = file_value
                .as_str()
                .ok_or_else(|| {
                    Error::type_error("'file' must be a string", Some(file_node.origin.clone()))
                })?
                .to_string();
            let url = optional_string_field(ctor, node, "url")?;
            let username = optional_string_field(ctor, node, "username")?;
            let password = optional_string_field(ctor, node, "password")?;
            let git_ref = optional_string_field(ctor, node, "ref")?;
            let refresh = optional_string_field(ctor, node, "refresh")?
                .unwrap_or_else(|| "1d".to_string());
            let vars_node = node.find_mapping_value("vars");
            (file_text, url, username, password, git_ref, refresh, vars_node)
        }
        RawKind::Scalar { text, .. } => {
            (text.trim().to_string(), None, None, None, None, "1d".to_string(), None)
        }
        RawKind::Sequence(_) => {
            return Err(Error::type_error(
                "!include does not accept a sequence",
                Some(node.origin.clone()),
            ))
        }
    };

    let base_dir = match url {
        Some(url) => {
            let spec = GitFetchSpec {
                url,
                git_ref,
                refresh,
                domain: "includes".to_string(),
                username,
                password,
            };
            ctor.loader.git_fetcher.fetch(&spec)?
        }
        None => ctor.current_dir.clone(),
    };
    let path = base_dir.join(&file_text);

    let mut child_env = ctor.env.child();
    if let Some(vars_node) = vars_node {
        let vars_value = ctor.construct(vars_node)?;
        let map = vars_value.as_mapping().ok_or_else(|| {
            Error::type_error("'vars' must be a mapping", Some(vars_node.origin.clone()))
        })?;
        for (k, v) in map {
            child_env.insert(k.clone(), v.clone());
        }
    }

    ctor.loader.load_internal(&path, child_env, false)
}

fn literal(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let prev = ctor.disable_str_expansion;
    ctor.disable_str_expansion = true;
    let result = ctor.construct_standard(node);
    ctor.disable_str_expansion = prev;
    result
}

fn for_(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    if ctor.disable_str_expansion {
        return Ok(AnnotatedValue::null(node.origin.clone()));
    }

    let items_node = node.find_mapping_value("items").ok_or_else(|| {
        Error::missing_field("!for requires 'items'", Some(node.origin.clone()))
    })?;
    let var_node = node.find_mapping_value("var");
    let repeat_node = node.find_mapping_value("repeat").ok_or_else(|| {
        Error::missing_field("!for requires 'repeat'", Some(node.origin.clone()))
    })?;

    let varname = match var_node {
        Some(n) => {
            let v = ctor.construct(n)?;
            v.as_str()
                .ok_or_else(|| {
                    Error::type_error("'var' must be a string", Some(n.origin.clone()))
                })?
                .to_string()
        }
        None => "item".to_string(),
    };

    let items_value = ctor.construct(items_node)?;
    let items: Vec<AnnotatedValue> = match &items_value.kind {
        ValueKind::Sequence(v) | ValueKind::SpreadSequence(v) => v.clone(),
        ValueKind::String(name) => {
            let resolved = ctor.env.get(name).cloned().ok_or_else(|| {
                Error::name_lookup(
                    format!("undefined variable '{name}'"),
                    Some(items_node.origin.clone()),
                )
            })?;
            match resolved.kind {
                ValueKind::Sequence(v) | ValueKind::SpreadSequence(v) => v,
                _ => {
                    return Err(Error::type_error(
                        "items must be a list",
                        Some(items_node.origin.clone()),
                    ))
                }
            }
        }
        _ => {
            return Err(Error::type_error(
                "'items' must be a list or a string naming a list variable",
                Some(items_node.origin.clone()),
            ))
        }
    };

    let parent_env = ctor.env.clone();
    let mut result = Vec::with_capacity(items.len());
    for item in items {
        let mut child_env = parent_env.child();
        child_env.insert(varname.clone(), item);
        ctor.env = child_env;
        let value = ctor.construct(repeat_node)?;
        result.push(value);
    }
    ctor.env = parent_env;

    Ok(AnnotatedValue::new(
        ValueKind::SpreadSequence(result),
        node.origin.clone(),
    ))
}

fn if_(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    if ctor.disable_str_expansion {
        return Ok(AnnotatedValue::null(node.origin.clone()));
    }

    let condition_node = node.find_mapping_value("condition").ok_or_else(|| {
        Error::missing_field("!if requires 'condition'", Some(node.origin.clone()))
    })?;
    let then_node = node.find_mapping_value("then");
    let else_node = node.find_mapping_value("else");

    let then_node = then_node.ok_or_else(|| {
        Error::missing_field("!if requires 'then'", Some(node.origin.clone()))
    })?;

    let condition = ctor.construct(condition_node)?;
    if condition.is_truthy() {
        ctor.construct(then_node)
    } else if let Some(else_node) = else_node {
        ctor.construct(else_node)
    } else {
        Ok(AnnotatedValue::null(node.origin.clone()))
    }
}

fn merge(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    if ctor.disable_str_expansion {
        return Ok(AnnotatedValue::null(node.origin.clone()));
    }
    if !matches!(node.kind, RawKind::Sequence(_)) {
        return Err(Error::type_error(
            "!merge expects a list",
            Some(node.origin.clone()),
        ));
    }
    let sequence_value = ctor.construct_standard(node)?;
    let items = match sequence_value.kind {
        ValueKind::Sequence(v) => v,
        _ => unreachable!("a sequence node always constructs to ValueKind::Sequence"),
    };
    Ok(crate::merge::merge_all(items))
}

/// Discovers `*.yaml` files recursively under `dir`, pruning hidden files and
/// directories and returning them in a stable, sorted order.
fn discover_yaml_files(dir: &std::path::Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(dir).sort_by_file_name().into_iter().filter_entry(|e| {
        e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
    });
    for entry in walker {
        let entry = entry.map_err(|e| Error::io(e.to_string(), None))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if entry.path().extension().map(|ext| ext == "yaml").unwrap_or(false) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn include_dir_base(ctor: &mut Constructor, node: &RawNode) -> Result<Vec<PathBuf>> {
    let dir_text = scalar_text(node)?.trim();
    let dir = ctor.current_dir.join(dir_text);
    discover_yaml_files(&dir)
}

fn include_dir_list(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let files = include_dir_base(ctor, node)?;
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let env = ctor.env.child();
        results.push(ctor.loader.load_internal(&file, env, false)?);
    }
    Ok(AnnotatedValue::new(ValueKind::Sequence(results), node.origin.clone()))
}

fn include_dir_merge_list(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let files = include_dir_base(ctor, node)?;
    let mut results = Vec::new();
    for file in files {
        let env = ctor.env.child();
        let value = ctor.loader.load_internal(&file, env, false)?;
        if let ValueKind::Sequence(items) = value.kind {
            results.extend(items);
        }
    }
    Ok(AnnotatedValue::new(ValueKind::Sequence(results), node.origin.clone()))
}

fn include_dir_named(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let files = include_dir_base(ctor, node)?;
    let mut map = IndexMap::new();
    for file in files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let env = ctor.env.child();
        let value = ctor.loader.load_internal(&file, env, false)?;
        map.insert(stem, value);
    }
    Ok(AnnotatedValue::new(ValueKind::Mapping(map), node.origin.clone()))
}

fn include_dir_merge_named(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let files = include_dir_base(ctor, node)?;
    let mut map = IndexMap::new();
    for file in files {
        let env = ctor.env.child();
        let value = ctor.loader.load_internal(&file, env, false)?;
        if let ValueKind::Mapping(entries) = value.kind {
            for (k, v) in entries {
                map.insert(k, v);
            }
        }
    }
    Ok(AnnotatedValue::new(ValueKind::Mapping(map), node.origin.clone()))
}

fn lambda(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let text = scalar_text(node)?.to_string();
    let value = ctor.construct_string(node, &text)?;
    match value.kind {
        ValueKind::String(body) => {
            Ok(AnnotatedValue::new(ValueKind::Lambda(body), node.origin.clone()))
        }
        _ => unreachable!("construct_string always produces ValueKind::String"),
    }
}

fn force(ctor: &mut Constructor, node: &RawNode) -> Result<AnnotatedValue> {
    let value = ctor.construct_standard(node)?;
    Ok(value.forced())
}
