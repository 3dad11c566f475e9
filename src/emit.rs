//! Serializes an annotated value back to YAML text with secret-aware
//! redaction and canonical numeric formatting. Grounded on
//! `esphome/yaml_util.py`'s `ESPHomeDumper` (`represent_*` family), minus its
//! reliance on PyYAML's representer registry — this crate hand-rolls a small
//! block-style emitter since there is no equivalent customization point in
//! `yaml-rust2` for secret-aware scalar substitution.

use crate::secrets::SecretRegistry;
use crate::value::{AnnotatedValue, ValueKind};
use indexmap::IndexMap;

/// Produces YAML text for `value`, redacting any scalar registered in
/// `secrets` as `!secret NAME`.
pub fn dump(value: &AnnotatedValue, secrets: &SecretRegistry) -> String {
    render_block(value, secrets, 0)
}

/// Checks `text` against the secret registry and, on a hit, returns the
/// `!secret NAME` scalar a caller should emit instead. Exposed so the
/// downstream schema-validation layer can apply the same redaction rule to
/// its own higher-level stringified scalars (IP/MAC addresses, durations,
/// UUIDs) without duplicating the lookup.
pub fn secret_scalar(text: &str, secrets: &SecretRegistry) -> Option<String> {
    secrets.lookup(text).map(|name| format!("!secret {name}"))
}

fn is_collection(value: &AnnotatedValue) -> bool {
    matches!(
        &value.kind,
        ValueKind::Mapping(_) | ValueKind::Sequence(_) | ValueKind::SpreadSequence(_) | ValueKind::OrderedMap(_)
    )
}

fn is_empty_collection(value: &AnnotatedValue) -> bool {
    match &value.kind {
        ValueKind::Mapping(m) => m.is_empty(),
        ValueKind::Sequence(s) | ValueKind::SpreadSequence(s) => s.is_empty(),
        ValueKind::OrderedMap(p) => p.is_empty(),
        _ => false,
    }
}

/// The inline flow-style token an empty collection renders as. `None` for
/// non-collections (handled by `render_scalar` instead).
fn empty_collection_token(value: &AnnotatedValue) -> Option<&'static str> {
    match &value.kind {
        ValueKind::Mapping(_) | ValueKind::OrderedMap(_) => Some("{}"),
        ValueKind::Sequence(_) | ValueKind::SpreadSequence(_) => Some("[]"),
        _ => None,
    }
}

fn render_block(value: &AnnotatedValue, secrets: &SecretRegistry, indent: usize) -> String {
    let mut out = String::new();
    match &value.kind {
        ValueKind::Mapping(map) => write_mapping(map, secrets, indent, &mut out),
        ValueKind::OrderedMap(pairs) => write_omap(pairs, secrets, indent, &mut out),
        ValueKind::Sequence(items) | ValueKind::SpreadSequence(items) => {
            write_sequence(items, secrets, indent, &mut out)
        }
        ValueKind::Lambda(body) => write_lambda(body, secrets, indent, &mut out),
        _ => {
            out.push_str(&"  ".repeat(indent));
            out.push_str(&render_scalar(value, secrets));
            out.push('\n');
        }
    }
    out
}

fn write_mapping(map: &IndexMap<String, AnnotatedValue>, secrets: &SecretRegistry, indent: usize, out: &mut String) {
    if map.is_empty() {
        out.push_str(&"  ".repeat(indent));
        out.push_str("{}\n");
        return;
    }
    let prefix = "  ".repeat(indent);
    for (key, v) in map {
        out.push_str(&prefix);
        out.push_str(&quote_if_needed(key));
        out.push(':');
        if is_collection(v) && !is_empty_collection(v) {
            out.push('\n');
            out.push_str(&render_block(v, secrets, indent + 1));
        } else if let Some(token) = empty_collection_token(v) {
            out.push(' ');
            out.push_str(token);
            out.push('\n');
        } else if let ValueKind::Lambda(body) = &v.kind {
            out.push(' ');
            write_lambda_after_key(body, secrets, indent + 1, out);
        } else {
            out.push(' ');
            out.push_str(&render_scalar(v, secrets));
            out.push('\n');
        }
    }
}

fn write_omap(pairs: &[(String, AnnotatedValue)], secrets: &SecretRegistry, indent: usize, out: &mut String) {
    out.push_str(&"  ".repeat(indent));
    out.push_str("!!omap\n");
    let items: Vec<AnnotatedValue> = pairs
        .iter()
        .map(|(k, v)| {
            let mut m = IndexMap::new();
            m.insert(k.clone(), v.clone());
            AnnotatedValue::new(ValueKind::Mapping(m), v.origin.clone())
        })
        .collect();
    write_sequence(&items, secrets, indent, out);
}

fn write_sequence(items: &[AnnotatedValue], secrets: &SecretRegistry, indent: usize, out: &mut String) {
    if items.is_empty() {
        out.push_str(&"  ".repeat(indent));
        out.push_str("[]\n");
        return;
    }
    let prefix = "  ".repeat(indent);
    for item in items {
        out.push_str(&prefix);
        out.push_str("- ");
        if is_collection(item) && !is_empty_collection(item) {
            let body = render_block(item, secrets, indent + 1);
            splice_after_dash(&body, out);
        } else if let Some(token) = empty_collection_token(item) {
            out.push_str(token);
            out.push('\n');
        } else if let ValueKind::Lambda(body) = &item.kind {
            write_lambda_after_key(body, secrets, indent + 1, out);
        } else {
            out.push_str(&render_scalar(item, secrets));
            out.push('\n');
        }
    }
}

/// Appends `body` (a rendered nested block) right after a `"- "` prefix
/// already written to `out`: the first line is spliced in inline (its own
/// indentation stripped), subsequent lines are kept as-is so nested keys
/// align under the dash.
fn splice_after_dash(body: &str, out: &mut String) {
    let mut lines = body.lines();
    if let Some(first) = lines.next() {
        out.push_str(first.trim_start());
        out.push('\n');
    }
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
}

fn write_lambda(body: &str, secrets: &SecretRegistry, indent: usize, out: &mut String) {
    out.push_str(&"  ".repeat(indent));
    write_lambda_after_key(body, secrets, indent, out);
}

fn write_lambda_after_key(body: &str, secrets: &SecretRegistry, indent: usize, out: &mut String) {
    if let Some(name) = secrets.lookup(body) {
        out.push_str("!secret ");
        out.push_str(name);
        out.push('\n');
        return;
    }
    out.push_str("!lambda |\n");
    let prefix = "  ".repeat(indent);
    for line in body.lines() {
        out.push_str(&prefix);
        out.push_str(line);
        out.push('\n');
    }
}

fn render_scalar(value: &AnnotatedValue, secrets: &SecretRegistry) -> String {
    match &value.kind {
        ValueKind::Null => "null".to_string(),
        ValueKind::Bool(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        ValueKind::Integer(i) => {
            let text = i.to_string();
            secret_scalar(&text, secrets).unwrap_or(text)
        }
        ValueKind::Float(f) => {
            let text = format_float(*f);
            secret_scalar(&text, secrets).unwrap_or(text)
        }
        ValueKind::String(s) => secret_scalar(s, secrets).unwrap_or_else(|| quote_if_needed(s)),
        ValueKind::Binary(bytes) => {
            let encoded =
                base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes);
            format!("!!binary {encoded}")
        }
        ValueKind::Mapping(_) | ValueKind::Sequence(_) | ValueKind::SpreadSequence(_) | ValueKind::OrderedMap(_) => {
            unreachable!("collections are rendered by render_block, not render_scalar")
        }
        ValueKind::Lambda(_) => unreachable!("lambdas are rendered by write_lambda"),
    }
}

/// Mirrors the source dumper's float fixup: `repr`-style shortest decimal,
/// switched to exponential notation for very large/small magnitudes, with a
/// `.` forced in before any missing decimal point.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return ".nan".to_string();
    }
    if f.is_infinite() {
        return if f.is_sign_positive() { ".inf".to_string() } else { "-.inf".to_string() };
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0".to_string() } else { "0.0".to_string() };
    }

    let abs = f.abs();
    let mut text = if !(1e-4..1e16).contains(&abs) {
        format!("{f:e}")
    } else {
        format!("{f}")
    };

    if !text.contains('.') {
        match text.find('e') {
            Some(epos) => text.insert_str(epos, ".0"),
            None => text.push_str(".0"),
        }
    }
    text
}

fn needs_quoting(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    if s.trim() != s {
        return true;
    }
    if s.contains(": ") || s.contains('\n') || s.contains('#') || s.ends_with(':') {
        return true;
    }
    let first = s.chars().next().expect("checked non-empty above");
    if "!&*-?|>%@`\"'#,[]{}:".contains(first) {
        return true;
    }
    if matches!(
        s,
        "~" | "null" | "Null" | "NULL" | "true" | "True" | "TRUE" | "false" | "False" | "FALSE"
            | ".nan" | ".NaN" | ".NAN" | ".inf" | ".Inf" | ".INF" | "-.inf" | "-.Inf" | "-.INF"
    ) {
        return true;
    }
    if s.parse::<i64>().is_ok() || s.parse::<f64>().is_ok() {
        return true;
    }
    false
}

fn quote_if_needed(s: &str) -> String {
    if needs_quoting(s) {
        let escaped = s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
        format!("\"{escaped}\"")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Origin;

    fn string(s: &str) -> AnnotatedValue {
        AnnotatedValue::string(s, Origin::synthetic())
    }

    fn mapping(entries: Vec<(&str, AnnotatedValue)>) -> AnnotatedValue {
        let mut map = IndexMap::new();
        for (k, v) in entries {
            map.insert(k.to_string(), v);
        }
        AnnotatedValue::new(ValueKind::Mapping(map), Origin::synthetic())
    }

    #[test]
    fn bools_render_lowercase() {
        let secrets = SecretRegistry::new();
        let value = AnnotatedValue::new(ValueKind::Bool(true), Origin::synthetic());
        assert_eq!(render_scalar(&value, &secrets), "true");
    }

    #[test]
    fn float_exponent_always_has_a_dot() {
        assert_eq!(format_float(1e17), "1.0e17");
        assert_eq!(format_float(f64::NAN), ".nan");
        assert_eq!(format_float(f64::INFINITY), ".inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-.inf");
        assert_eq!(format_float(2.0), "2.0");
    }

    #[test]
    fn secret_values_are_redacted_on_emit() {
        let mut secrets = SecretRegistry::new();
        secrets.register("hunter2", "wifi_password");
        let doc = mapping(vec![("password", string("hunter2"))]);
        let out = dump(&doc, &secrets);
        assert!(out.contains("!secret wifi_password"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn plain_strings_stay_unquoted() {
        let secrets = SecretRegistry::new();
        let doc = mapping(vec![("name", string("living_room"))]);
        let out = dump(&doc, &secrets);
        assert_eq!(out, "name: living_room\n");
    }

    #[test]
    fn empty_mapping_and_sequence_values_render_inline_without_panicking() {
        let secrets = SecretRegistry::new();
        let empty_map = AnnotatedValue::new(ValueKind::Mapping(IndexMap::new()), Origin::synthetic());
        let empty_seq = AnnotatedValue::new(ValueKind::Sequence(Vec::new()), Origin::synthetic());
        let doc = mapping(vec![("a", empty_map), ("b", empty_seq)]);
        let out = dump(&doc, &secrets);
        assert_eq!(out, "a: {}\nb: []\n");
    }

    #[test]
    fn empty_collection_sequence_items_render_inline_without_panicking() {
        let secrets = SecretRegistry::new();
        let empty_map = AnnotatedValue::new(ValueKind::Mapping(IndexMap::new()), Origin::synthetic());
        let doc = AnnotatedValue::new(ValueKind::Sequence(vec![empty_map]), Origin::synthetic());
        let out = dump(&doc, &secrets);
        assert_eq!(out, "- {}\n");
    }

    #[test]
    fn ambiguous_strings_get_quoted() {
        let secrets = SecretRegistry::new();
        let doc = mapping(vec![("flag", string("true"))]);
        let out = dump(&doc, &secrets);
        assert_eq!(out, "flag: \"true\"\n");
    }
}
