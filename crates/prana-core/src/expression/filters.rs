//! Pipe filter registry (§4.2). Dispatch is by-name then by-value-type, in
//! the style of the teacher's `extensions::call_method`/`call_function`
//! dispatch, but with the spec's exact snake_case filter set rather than
//! the teacher's JS-method names. Unknown filters always error, even in
//! graceful mode.

use prana_workflow::Value;
use serde_json::{json, Map, Number};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct FilterError(pub String);

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FilterError {}

pub fn apply(name: &str, value: Value, args: &[Value]) -> Result<Value, FilterError> {
    match name {
        "upper_case" => Ok(Value::String(as_str_or_empty(&value).to_uppercase())),
        "lower_case" => Ok(Value::String(as_str_or_empty(&value).to_lowercase())),
        "capitalize" => Ok(Value::String(capitalize(as_str_or_empty(&value)))),
        "truncate" => truncate(&value, args),
        "default" => Ok(if value.is_null() {
            args.first().cloned().unwrap_or(Value::Null)
        } else {
            value
        }),

        "round" => round(&value, args),
        "format_currency" => format_currency(&value, args),
        "abs" => Ok(json!(as_f64(&value)?.abs())),
        "ceil" => Ok(json!(as_f64(&value)?.ceil())),
        "floor" => Ok(json!(as_f64(&value)?.floor())),
        "max" => Ok(json!(as_f64(&value)?.max(arg_f64(args, 0)?))),
        "min" => Ok(json!(as_f64(&value)?.min(arg_f64(args, 0)?))),
        "power" => Ok(json!(as_f64(&value)?.powf(arg_f64(args, 0)?))),
        "sqrt" => Ok(json!(as_f64(&value)?.sqrt())),
        "modulo" => Ok(json!(as_f64(&value)? % arg_f64(args, 0)?)),
        "clamp" => {
            let lo = arg_f64(args, 0)?;
            let hi = arg_f64(args, 1)?;
            Ok(json!(as_f64(&value)?.clamp(lo, hi)))
        }

        "length" => length(&value),
        "first" => first(&value),
        "last" => last(&value),
        "join" => join(&value, args),
        "sort" => sort(&value),
        "reverse" => reverse(&value),
        "uniq" => uniq(&value),
        "slice" => slice(&value, args),
        "contains" => contains(&value, args),
        "compact" => Ok(Value::Array(
            as_array(&value)?
                .iter()
                .filter(|v| prana_workflow::is_truthy(v))
                .cloned()
                .collect(),
        )),
        "flatten" => flatten(&value),
        "sum" => sum(&value),
        "keys" => keys(&value),
        "values" => values(&value),
        "group_by" => group_by(&value, args),
        "map" => map_field(&value, args),
        "filter" => filter_field(&value, args, true),
        "reject" => filter_field(&value, args, false),
        "dump" => Ok(Value::String(value.to_string())),

        other => Err(FilterError(format!("unknown filter '{other}'"))),
    }
}

fn as_str(value: &Value) -> Result<&str, FilterError> {
    value
        .as_str()
        .ok_or_else(|| FilterError(format!("filter requires a string, got {value}")))
}

/// Nil renders as the empty string rather than erroring, so a missing
/// field piped through a casing filter (`{{ $input.missing | upper_case }}`)
/// yields `""` instead of failing the whole render.
fn as_str_or_empty(value: &Value) -> &str {
    value.as_str().unwrap_or("")
}

fn as_f64(value: &Value) -> Result<f64, FilterError> {
    value
        .as_f64()
        .ok_or_else(|| FilterError(format!("filter requires a number, got {value}")))
}

fn as_array(value: &Value) -> Result<&Vec<Value>, FilterError> {
    value
        .as_array()
        .ok_or_else(|| FilterError(format!("filter requires a list, got {value}")))
}

fn arg_f64(args: &[Value], index: usize) -> Result<f64, FilterError> {
    args.get(index)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| FilterError(format!("filter requires numeric argument {index}")))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn truncate(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let s = as_str(value)?;
    let n = args
        .first()
        .and_then(|v| v.as_u64())
        .ok_or_else(|| FilterError("truncate requires a length argument".to_string()))? as usize;
    let suffix = args
        .get(1)
        .and_then(|v| v.as_str())
        .unwrap_or("...")
        .to_string();
    if s.chars().count() <= n {
        return Ok(Value::String(s.to_string()));
    }
    let truncated: String = s.chars().take(n).collect();
    Ok(Value::String(format!("{truncated}{suffix}")))
}

fn round(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let n = as_f64(value)?;
    let digits = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
    let factor = 10f64.powi(digits as i32);
    Ok(json!((n * factor).round() / factor))
}

fn format_currency(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let n = as_f64(value)?;
    let code = args.first().and_then(|v| v.as_str()).unwrap_or("USD");
    Ok(Value::String(format!("{n:.2} {code}")))
}

fn length(value: &Value) -> Result<Value, FilterError> {
    match value {
        Value::String(s) => Ok(json!(s.chars().count())),
        Value::Array(a) => Ok(json!(a.len())),
        Value::Object(o) => Ok(json!(o.len())),
        other => Err(FilterError(format!("length is not defined for {other}"))),
    }
}

fn first(value: &Value) -> Result<Value, FilterError> {
    match value {
        Value::Array(a) => Ok(a.first().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s
            .chars()
            .next()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        other => Err(FilterError(format!("first is not defined for {other}"))),
    }
}

fn last(value: &Value) -> Result<Value, FilterError> {
    match value {
        Value::Array(a) => Ok(a.last().cloned().unwrap_or(Value::Null)),
        Value::String(s) => Ok(s
            .chars()
            .last()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        other => Err(FilterError(format!("last is not defined for {other}"))),
    }
}

fn join(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let sep = args.first().and_then(|v| v.as_str()).unwrap_or(", ");
    let items = as_array(value)?;
    Ok(Value::String(
        items
            .iter()
            .map(prana_workflow::stringify)
            .collect::<Vec<_>>()
            .join(sep),
    ))
}

fn sort(value: &Value) -> Result<Value, FilterError> {
    let mut items = as_array(value)?.clone();
    items.sort_by(compare_for_sort);
    Ok(Value::Array(items))
}

fn compare_for_sort(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => prana_workflow::stringify(a).cmp(&prana_workflow::stringify(b)),
    }
}

fn reverse(value: &Value) -> Result<Value, FilterError> {
    match value {
        Value::Array(a) => {
            let mut items = a.clone();
            items.reverse();
            Ok(Value::Array(items))
        }
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        other => Err(FilterError(format!("reverse is not defined for {other}"))),
    }
}

fn uniq(value: &Value) -> Result<Value, FilterError> {
    let items = as_array(value)?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let key = item.to_string();
        if seen.insert(key) {
            out.push(item.clone());
        }
    }
    Ok(Value::Array(out))
}

fn slice(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let items = as_array(value)?;
    let start = args
        .first()
        .and_then(|v| v.as_u64())
        .ok_or_else(|| FilterError("slice requires a start argument".to_string()))? as usize;
    let count = args
        .get(1)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| FilterError("slice requires a count argument".to_string()))? as usize;
    let end = (start + count).min(items.len());
    if start >= items.len() {
        return Ok(Value::Array(Vec::new()));
    }
    Ok(Value::Array(items[start..end].to_vec()))
}

fn contains(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let needle = args
        .first()
        .ok_or_else(|| FilterError("contains requires an argument".to_string()))?;
    match value {
        Value::Array(a) => Ok(json!(a.contains(needle))),
        Value::String(s) => {
            let needle_str = needle
                .as_str()
                .ok_or_else(|| FilterError("contains on a string requires a string argument".to_string()))?;
            Ok(json!(s.contains(needle_str)))
        }
        other => Err(FilterError(format!("contains is not defined for {other}"))),
    }
}

fn flatten(value: &Value) -> Result<Value, FilterError> {
    let items = as_array(value)?;
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) => out.extend(inner.clone()),
            other => out.push(other.clone()),
        }
    }
    Ok(Value::Array(out))
}

fn sum(value: &Value) -> Result<Value, FilterError> {
    let items = as_array(value)?;
    let mut total = 0.0;
    for item in items {
        total += as_f64(item)?;
    }
    Ok(json!(total))
}

fn keys(value: &Value) -> Result<Value, FilterError> {
    let obj = value
        .as_object()
        .ok_or_else(|| FilterError(format!("keys requires a map, got {value}")))?;
    Ok(Value::Array(obj.keys().map(|k| json!(k)).collect()))
}

fn values(value: &Value) -> Result<Value, FilterError> {
    let obj = value
        .as_object()
        .ok_or_else(|| FilterError(format!("values requires a map, got {value}")))?;
    Ok(Value::Array(obj.values().cloned().collect()))
}

fn group_by(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let field = args
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(|| FilterError("group_by requires a field name argument".to_string()))?;
    let items = as_array(value)?;
    let mut groups: Map<String, Value> = Map::new();
    for item in items {
        let key = item
            .get(field)
            .map(prana_workflow::stringify)
            .unwrap_or_default();
        groups
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .unwrap()
            .push(item.clone());
    }
    Ok(Value::Object(groups))
}

fn map_field(value: &Value, args: &[Value]) -> Result<Value, FilterError> {
    let field = args
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(|| FilterError("map requires a field name argument".to_string()))?;
    let items = as_array(value)?;
    Ok(Value::Array(
        items
            .iter()
            .map(|item| item.get(field).cloned().unwrap_or(Value::Null))
            .collect(),
    ))
}

fn filter_field(value: &Value, args: &[Value], keep_matching: bool) -> Result<Value, FilterError> {
    let field = args
        .first()
        .and_then(|v| v.as_str())
        .ok_or_else(|| FilterError("filter/reject requires a field name argument".to_string()))?;
    let target = args
        .get(1)
        .ok_or_else(|| FilterError("filter/reject requires a value argument".to_string()))?;
    let items = as_array(value)?;
    Ok(Value::Array(
        items
            .iter()
            .filter(|item| {
                let matches = item.get(field).map(|v| v == target).unwrap_or(false);
                matches == keep_matching
            })
            .cloned()
            .collect(),
    ))
}

#[allow(dead_code)]
fn number_from_f64(n: f64) -> Number {
    Number::from_f64(n).unwrap_or_else(|| Number::from(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upper_case_uppercases_string() {
        assert_eq!(apply("upper_case", json!("hi"), &[]).unwrap(), json!("HI"));
    }

    #[test]
    fn upper_case_on_null_yields_empty_string() {
        assert_eq!(apply("upper_case", Value::Null, &[]).unwrap(), json!(""));
    }

    #[test]
    fn sort_then_join_produces_csv() {
        let sorted = apply("sort", json!([3, 1, 2]), &[]).unwrap();
        let joined = apply("join", sorted, &[json!(",")]).unwrap();
        assert_eq!(joined, json!("1,2,3"));
    }

    #[test]
    fn unknown_filter_errors() {
        assert!(apply("nope", json!(1), &[]).is_err());
    }

    #[test]
    fn default_replaces_null_only() {
        assert_eq!(apply("default", Value::Null, &[json!("x")]).unwrap(), json!("x"));
        assert_eq!(apply("default", json!("y"), &[json!("x")]).unwrap(), json!("y"));
    }

    #[test]
    fn clamp_bounds_value() {
        assert_eq!(apply("clamp", json!(15), &[json!(0), json!(10)]).unwrap(), json!(10.0));
    }

    #[test]
    fn group_by_buckets_by_field() {
        let items = json!([{"kind": "a", "v": 1}, {"kind": "b", "v": 2}, {"kind": "a", "v": 3}]);
        let grouped = apply("group_by", items, &[json!("kind")]).unwrap();
        assert_eq!(grouped["a"].as_array().unwrap().len(), 2);
        assert_eq!(grouped["b"].as_array().unwrap().len(), 1);
    }
}
