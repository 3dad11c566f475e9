//! String-level templating, driven by a `Environment`.
//!
//! Mirrors the three exception kinds the original Python loader distinguishes
//! from Jinja2 (`UndefinedError`, `TemplateSyntaxError`, `TemplateError`): an
//! undefined variable, a syntax error with a line number, and everything else.

use crate::environment::Environment;
use crate::value::{AnnotatedValue, ValueKind};
use minijinja::{Environment as JinjaEnv, ErrorKind, UndefinedBehavior};
use std::fmt;

#[derive(Debug)]
pub enum ExpandError {
    Undefined { detail: String },
    Syntax { line: usize, message: String },
    Other { message: String },
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpandError::Undefined { detail } => write!(f, "undefined variable: {detail}"),
            ExpandError::Syntax { line, message } => {
                write!(f, "template syntax error at line {line}: {message}")
            }
            ExpandError::Other { message } => write!(f, "template error: {message}"),
        }
    }
}

impl std::error::Error for ExpandError {}

/// Expands `template` against `env`. Returns the original string unchanged if
/// it contains no template syntax recognized by the engine.
pub fn expand(template: &str, env: &Environment) -> Result<String, ExpandError> {
    let mut jinja = JinjaEnv::new();
    jinja.set_undefined_behavior(UndefinedBehavior::Strict);
    jinja
        .add_template("expr", template)
        .map_err(classify)?;
    let tmpl = jinja.get_template("expr").expect("just added");
    let ctx = minijinja::Value::from_serialize(&environment_to_json(env));
    tmpl.render(ctx).map_err(classify)
}

fn classify(err: minijinja::Error) -> ExpandError {
    match err.kind() {
        ErrorKind::UndefinedError => ExpandError::Undefined {
            detail: err.detail().map(|d| d.to_string()).unwrap_or_else(|| err.to_string()),
        },
        ErrorKind::SyntaxError => ExpandError::Syntax {
            line: err.line().unwrap_or(1),
            message: err.to_string(),
        },
        _ => ExpandError::Other {
            message: err.to_string(),
        },
    }
}

fn environment_to_json(env: &Environment) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in env.iter() {
        map.insert(name.to_string(), value_to_json(value));
    }
    serde_json::Value::Object(map)
}

fn value_to_json(value: &AnnotatedValue) -> serde_json::Value {
    match &value.kind {
        ValueKind::Null => serde_json::Value::Null,
        ValueKind::Bool(b) => serde_json::Value::Bool(*b),
        ValueKind::Integer(i) => serde_json::Value::from(*i),
        ValueKind::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueKind::String(s) => serde_json::Value::String(s.clone()),
        ValueKind::Lambda(s) => serde_json::Value::String(s.clone()),
        ValueKind::Binary(b) => {
            serde_json::Value::String(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b))
        }
        ValueKind::Sequence(items) | ValueKind::SpreadSequence(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        ValueKind::Mapping(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
        ValueKind::OrderedMap(pairs) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in pairs {
                obj.insert(k.clone(), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Origin;

    #[test]
    fn substitutes_a_variable() {
        let mut env = Environment::new();
        env.insert("name", AnnotatedValue::string("world", Origin::synthetic()));
        assert_eq!(expand("hello {{ name }}", &env).unwrap(), "hello world");
    }

    #[test]
    fn strings_without_template_syntax_pass_through() {
        let env = Environment::new();
        assert_eq!(expand("plain text", &env).unwrap(), "plain text");
    }

    #[test]
    fn undefined_variable_is_its_own_error_kind() {
        let env = Environment::new();
        let err = expand("{{ missing }}", &env).unwrap_err();
        assert!(matches!(err, ExpandError::Undefined { .. }));
    }

    #[test]
    fn unclosed_expression_is_a_syntax_error() {
        let env = Environment::new();
        let err = expand("{{ name", &env).unwrap_err();
        assert!(matches!(err, ExpandError::Syntax { .. }));
    }
}
