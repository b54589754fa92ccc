//! Expression engine (§4.1): resolve a single path expression of the form
//! `$<root>(.<segment>|[<segment>])*` against a context mapping.
//!
//! Grounded on the lexer-driven style of the teacher's template parser, but
//! scaled down: this grammar has no operators, only a chain of path
//! segments, so a small hand-rolled character scanner is enough — no
//! `Lexer`/`Token` split is needed for something this narrow.

use prana_workflow::Value;
use serde_json::Map;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PathError {
    EmptyPath,
    MalformedBracket(String),
    NotAPathExpression,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::EmptyPath => write!(f, "empty path expression"),
            PathError::MalformedBracket(s) => write!(f, "malformed bracket segment: {s}"),
            PathError::NotAPathExpression => write!(f, "not a $-prefixed path expression"),
        }
    }
}

impl std::error::Error for PathError {}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
    Atom(String),
}

/// Resolve `expression` against `context`. Non-`$`-prefixed strings are
/// returned unchanged as a string value. Missing path segments produce
/// `Value::Null` (graceful); malformed syntax is an error.
pub fn extract(expression: &str, context: &Value) -> Result<Value, PathError> {
    if !expression.starts_with('$') {
        return Ok(Value::String(expression.to_string()));
    }

    let (root, segments) = parse_path(expression)?;
    let mut current = match context.as_object().and_then(|m| m.get(root.as_str())) {
        Some(v) => v.clone(),
        None => return Ok(Value::Null),
    };

    for seg in segments {
        current = match (&current, &seg) {
            (Value::Object(map), Segment::Key(k)) => map.get(k).cloned().unwrap_or(Value::Null),
            (Value::Object(map), Segment::Atom(a)) => map.get(a).cloned().unwrap_or(Value::Null),
            (Value::Object(map), Segment::Index(i)) => {
                map.get(&i.to_string()).cloned().unwrap_or(Value::Null)
            }
            (Value::Array(arr), Segment::Index(i)) => arr.get(*i).cloned().unwrap_or(Value::Null),
            (Value::Array(_), Segment::Key(_) | Segment::Atom(_)) => Value::Null,
            (Value::Null, _) => Value::Null,
            _ => Value::Null,
        };
    }

    Ok(current)
}

/// Parse `$root.segment[0]["key"][:atom]` into `(root, segments)`.
fn parse_path(expr: &str) -> Result<(String, Vec<Segment>), PathError> {
    let bytes = expr.as_bytes();
    if bytes.len() < 2 {
        return Err(PathError::EmptyPath);
    }
    let mut i = 1; // skip leading '$'
    let root_start = i;
    while i < bytes.len() && is_ident_byte(bytes[i]) {
        i += 1;
    }
    if i == root_start {
        return Err(PathError::EmptyPath);
    }
    let root = expr[root_start..i].to_string();

    let mut segments = Vec::new();
    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                i += 1;
                let start = i;
                while i < bytes.len() && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                if i == start {
                    return Err(PathError::MalformedBracket(expr[start..].to_string()));
                }
                segments.push(Segment::Key(expr[start..i].to_string()));
            }
            b'[' => {
                let close = expr[i..]
                    .find(']')
                    .map(|p| p + i)
                    .ok_or_else(|| PathError::MalformedBracket(expr[i..].to_string()))?;
                let inner = expr[i + 1..close].trim();
                segments.push(parse_bracket(inner)?);
                i = close + 1;
            }
            _ => return Err(PathError::MalformedBracket(expr[i..].to_string())),
        }
    }

    Ok((root, segments))
}

fn parse_bracket(inner: &str) -> Result<Segment, PathError> {
    if inner.is_empty() {
        return Err(PathError::MalformedBracket("[]".to_string()));
    }
    if let Ok(idx) = inner.parse::<usize>() {
        return Ok(Segment::Index(idx));
    }
    if let Some(atom) = inner.strip_prefix(':') {
        if atom.is_empty() || !atom.bytes().all(is_ident_byte) {
            return Err(PathError::MalformedBracket(inner.to_string()));
        }
        return Ok(Segment::Atom(atom.to_string()));
    }
    let quoted = (inner.starts_with('"') && inner.ends_with('"'))
        || (inner.starts_with('\'') && inner.ends_with('\''));
    if quoted && inner.len() >= 2 {
        return Ok(Segment::Key(inner[1..inner.len() - 1].to_string()));
    }
    Err(PathError::MalformedBracket(inner.to_string()))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Build a context object from named roots, the shape `extract` expects.
pub fn context_of(fields: Vec<(&str, Value)>) -> Value {
    let mut map = Map::new();
    for (k, v) in fields {
        map.insert(k.to_string(), v);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        context_of(vec![(
            "input",
            json!({"users": [{"name": "Ada"}, {"name": "Grace"}], "flag": true}),
        )])
    }

    #[test]
    fn dot_segment_resolves_map_key() {
        assert_eq!(extract("$input.flag", &ctx()).unwrap(), json!(true));
    }

    #[test]
    fn integer_bracket_indexes_list() {
        assert_eq!(
            extract("$input.users[0].name", &ctx()).unwrap(),
            json!("Ada")
        );
    }

    #[test]
    fn quoted_bracket_resolves_string_key() {
        assert_eq!(extract("$input[\"flag\"]", &ctx()).unwrap(), json!(true));
    }

    #[test]
    fn atom_bracket_resolves_opaque_key() {
        let ctx = context_of(vec![("vars", json!({"status": "ok"}))]);
        assert_eq!(extract("$vars[:status]", &ctx).unwrap(), json!("ok"));
    }

    #[test]
    fn missing_path_is_nil_not_error() {
        assert_eq!(extract("$input.missing.deep", &ctx()).unwrap(), Value::Null);
    }

    #[test]
    fn malformed_bracket_errors() {
        assert!(extract("$input[", &ctx()).is_err());
    }

    #[test]
    fn empty_path_errors() {
        assert!(extract("$", &ctx()).is_err());
    }

    #[test]
    fn non_dollar_string_passes_through() {
        assert_eq!(extract("plain", &ctx()).unwrap(), json!("plain"));
    }
}
