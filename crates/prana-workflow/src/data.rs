//! Runtime value types shared across the workflow data model.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// A value flowing through the graph: node params, routed input, action
/// output, and rendered template results are all `Value`.
///
/// Backed by `serde_json::Value` rather than a hand-rolled enum: the engine
/// already speaks JSON at its edges (action params/results, persisted
/// executions), and reusing `serde_json::Value` avoids a parallel conversion
/// layer the teacher's `GenericValue` needed only because it predated serde_json
/// in that crate.
pub type Value = JsonValue;

/// A mapping of parameter name to raw value or template string, as authored
/// on a `Node`.
pub type ParamMap = HashMap<String, Value>;

/// Returns the "falsy" classification used by `&&`/`||` truthiness rules:
/// `nil | false | 0 | "" | [] | {}`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a value the way the template renderer stringifies a non-passthrough
/// template result: `nil -> ""`, numbers base-10, bools `"true"/"false"`,
/// lists comma+space-joined, maps debug-inspected.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => DebugValue(value).to_string(),
    }
}

struct DebugValue<'a>(&'a Value);

impl fmt::Display for DebugValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default)]
    pub retry_on_failed: bool,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            retry_on_failed: false,
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_matches_falsy_set() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!(1)));
    }

    #[test]
    fn stringify_joins_lists_with_comma_space() {
        assert_eq!(stringify(&json!([1, 2, 3])), "1, 2, 3");
        assert_eq!(stringify(&Value::Null), "");
        assert_eq!(stringify(&json!(true)), "true");
    }
}
