//! Evaluates the `Expr`/`TemplateNode` trees produced by `parser` against a
//! `RenderContext` (§4.2). Grounded on the teacher's `Interpreter`, scaled
//! to the spec's fixed operator set: comparisons coerce numeric-looking
//! strings, arithmetic is strict-numeric only (division by zero errors),
//! `+` concatenates when either side is a string.

use super::context::RenderContext;
use super::filters::{self, FilterError};
use super::parser::{BinaryOp, Expr, FilterCall, PathSegment, TemplateNode, UnaryOp, VarPath};
use prana_workflow::{is_truthy, stringify, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LimitKind {
    Size,
    Nesting,
    Iterations,
    Recursion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    Parse(String),
    Eval(String),
    Filter(String),
    LimitExceeded(LimitKind),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Parse(s) => write!(f, "template parse error: {s}"),
            RenderError::Eval(s) => write!(f, "template evaluation error: {s}"),
            RenderError::Filter(s) => write!(f, "filter error: {s}"),
            RenderError::LimitExceeded(kind) => write!(f, "security limit exceeded: {kind:?}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<FilterError> for RenderError {
    fn from(e: FilterError) -> Self {
        RenderError::Filter(e.0)
    }
}

/// Resolve a `VarPath` (either `$root.seg...` or a bare loop-local
/// identifier) against the context.
fn eval_var(path: &VarPath, ctx: &RenderContext) -> Result<Value, RenderError> {
    let mut current = if path.dollar {
        ctx.root(&path.root).cloned().unwrap_or(Value::Null)
    } else if path.segments.is_empty() {
        ctx.local(&path.root).cloned().unwrap_or(Value::Null)
    } else {
        // `ident.foo` with a non-empty tail still starts from a local binding.
        ctx.local(&path.root).cloned().unwrap_or(Value::Null)
    };

    for seg in &path.segments {
        current = match (&current, seg) {
            (Value::Object(map), PathSegment::Dot(k) | PathSegment::Key(k) | PathSegment::Atom(k)) => {
                map.get(k).cloned().unwrap_or(Value::Null)
            }
            (Value::Array(arr), PathSegment::Index(i)) => {
                let idx = if *i < 0 {
                    None
                } else {
                    Some(*i as usize)
                };
                idx.and_then(|i| arr.get(i).cloned()).unwrap_or(Value::Null)
            }
            (Value::Object(map), PathSegment::Index(i)) => {
                map.get(&i.to_string()).cloned().unwrap_or(Value::Null)
            }
            _ => Value::Null,
        };
    }

    Ok(current)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn numbers_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    if matches!(a, Value::Number(_) | Value::String(_)) && matches!(b, Value::Number(_) | Value::String(_)) {
        return numbers_equal(a, b);
    }
    false
}

fn compare(op: BinaryOp, a: &Value, b: &Value) -> Result<bool, RenderError> {
    let (x, y) = match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(RenderError::Eval(format!(
                "cannot compare {a:?} and {b:?} numerically"
            )))
        }
    };
    Ok(match op {
        BinaryOp::Lt => x < y,
        BinaryOp::Le => x <= y,
        BinaryOp::Gt => x > y,
        BinaryOp::Ge => x >= y,
        _ => unreachable!(),
    })
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &mut RenderContext) -> Result<Value, RenderError> {
    match op {
        BinaryOp::Or => {
            let l = eval_expr(lhs, ctx)?;
            if is_truthy(&l) {
                return Ok(l);
            }
            eval_expr(rhs, ctx)
        }
        BinaryOp::And => {
            let l = eval_expr(lhs, ctx)?;
            if !is_truthy(&l) {
                return Ok(l);
            }
            eval_expr(rhs, ctx)
        }
        BinaryOp::Eq => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            Ok(Value::Bool(values_equal(&l, &r)))
        }
        BinaryOp::Ne => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            Ok(Value::Bool(!values_equal(&l, &r)))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            Ok(Value::Bool(compare(op, &l, &r)?))
        }
        BinaryOp::Add => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                Ok(Value::String(format!("{}{}", stringify(&l), stringify(&r))))
            } else {
                let x = as_number(&l)
                    .ok_or_else(|| RenderError::Eval(format!("cannot add non-numeric value {l:?}")))?;
                let y = as_number(&r)
                    .ok_or_else(|| RenderError::Eval(format!("cannot add non-numeric value {r:?}")))?;
                Ok(numeric_value(x + y))
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            let x = as_number(&l)
                .ok_or_else(|| RenderError::Eval(format!("arithmetic on non-numeric value {l:?}")))?;
            let y = as_number(&r)
                .ok_or_else(|| RenderError::Eval(format!("arithmetic on non-numeric value {r:?}")))?;
            let result = match op {
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => {
                    if y == 0.0 {
                        return Err(RenderError::Eval("division by zero".to_string()));
                    }
                    x / y
                }
                _ => unreachable!(),
            };
            Ok(numeric_value(result))
        }
    }
}

fn numeric_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

pub fn eval_expr(expr: &Expr, ctx: &mut RenderContext) -> Result<Value, RenderError> {
    match expr {
        Expr::Int(n) => Ok(Value::from(*n)),
        Expr::Float(n) => Ok(serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Var(path) => eval_var(path, ctx),
        Expr::Unary(UnaryOp::Not, inner) => {
            let v = eval_expr(inner, ctx)?;
            Ok(Value::Bool(!is_truthy(&v)))
        }
        Expr::Unary(UnaryOp::Neg, inner) => {
            let v = eval_expr(inner, ctx)?;
            let n = as_number(&v)
                .ok_or_else(|| RenderError::Eval(format!("cannot negate non-numeric value {v:?}")))?;
            Ok(numeric_value(-n))
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx),
        Expr::Pipe(inner, calls) => {
            let mut value = eval_expr(inner, ctx)?;
            for call in calls {
                value = eval_filter_call(call, value, ctx)?;
            }
            Ok(value)
        }
    }
}

fn eval_filter_call(call: &FilterCall, value: Value, ctx: &mut RenderContext) -> Result<Value, RenderError> {
    let mut args = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        args.push(eval_expr(arg, ctx)?);
    }
    Ok(filters::apply(&call.name, value, &args)?)
}

/// Security/iteration limits enforced while rendering a node list.
pub struct RenderLimits {
    pub max_loop_iterations: u64,
}

struct RenderState {
    iterations: u64,
    max_loop_iterations: u64,
}

/// Render a node list to a string, concatenating all pieces. Used whenever
/// the template is not a single bare `{{ }}` expression.
pub fn render_nodes_to_string(
    nodes: &[TemplateNode],
    ctx: &mut RenderContext,
    graceful: bool,
    limits: &RenderLimits,
) -> Result<String, RenderError> {
    let mut state = RenderState {
        iterations: 0,
        max_loop_iterations: limits.max_loop_iterations,
    };
    let mut out = String::new();
    render_nodes_into(nodes, ctx, graceful, &mut state, &mut out)?;
    Ok(out)
}

fn render_nodes_into(
    nodes: &[TemplateNode],
    ctx: &mut RenderContext,
    graceful: bool,
    state: &mut RenderState,
    out: &mut String,
) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            TemplateNode::Literal(s) => out.push_str(s),
            TemplateNode::Expr { raw, parsed } => match parsed {
                Ok(expr) => match eval_expr(expr, ctx) {
                    Ok(value) => out.push_str(&stringify(&value)),
                    Err(e) if graceful && matches!(e, RenderError::Eval(_)) => out.push_str(raw),
                    Err(e) => return Err(e),
                },
                Err(_) if graceful => out.push_str(raw),
                Err(e) => return Err(RenderError::Parse(e.0.clone())),
            },
            TemplateNode::If { cond, body } => {
                if is_truthy(&eval_expr(cond, ctx)?) {
                    render_nodes_into(body, ctx, graceful, state, out)?;
                }
            }
            TemplateNode::For { ident, iter, body } => {
                let iterable = eval_expr(iter, ctx)?;
                let items = match iterable {
                    Value::Array(items) => items,
                    other => {
                        return Err(RenderError::Eval(format!(
                            "cannot iterate over non-array value {other:?}"
                        )))
                    }
                };
                for (i, item) in items.into_iter().enumerate() {
                    state.iterations += 1;
                    if state.iterations > state.max_loop_iterations {
                        return Err(RenderError::LimitExceeded(LimitKind::Iterations));
                    }
                    let mut scope = std::collections::HashMap::new();
                    scope.insert(ident.clone(), item);
                    scope.insert("loop_index".to_string(), Value::from(i as i64));
                    ctx.push_scope(scope);
                    let result = render_nodes_into(body, ctx, graceful, state, out);
                    ctx.pop_scope();
                    result?;
                }
            }
        }
    }
    Ok(())
}

/// Render a node list that is a single bare `{{ expr }}` block, preserving
/// the evaluated value's type rather than stringifying it.
pub fn render_single_expr(
    expr: &Expr,
    raw: &str,
    ctx: &mut RenderContext,
    graceful: bool,
) -> Result<Value, RenderError> {
    match eval_expr(expr, ctx) {
        Ok(value) => Ok(value),
        Err(RenderError::Eval(_)) if graceful => Ok(Value::String(raw.to_string())),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::parse_expression;
    use serde_json::json;

    fn ctx_with(root: &str, value: Value) -> RenderContext {
        let mut map = serde_json::Map::new();
        map.insert(root.to_string(), value);
        RenderContext::new(map)
    }

    #[test]
    fn string_number_comparison_coerces() {
        let mut ctx = ctx_with("input", json!({"n": "5"}));
        let expr = parse_expression("$input.n > 3").unwrap();
        assert_eq!(eval_expr(&expr, &mut ctx).unwrap(), json!(true));
    }

    #[test]
    fn division_by_zero_errors() {
        let mut ctx = RenderContext::empty();
        let expr = parse_expression("1 / 0").unwrap();
        assert!(matches!(eval_expr(&expr, &mut ctx), Err(RenderError::Eval(_))));
    }

    #[test]
    fn plus_concatenates_when_either_side_is_string() {
        let mut ctx = RenderContext::empty();
        let expr = parse_expression("\"n=\" + 3").unwrap();
        assert_eq!(eval_expr(&expr, &mut ctx).unwrap(), json!("n=3"));
    }

    #[test]
    fn or_short_circuits_to_first_truthy() {
        let mut ctx = RenderContext::empty();
        let expr = parse_expression("0 || 5").unwrap();
        assert_eq!(eval_expr(&expr, &mut ctx).unwrap(), json!(5));
    }

    #[test]
    fn pipe_applies_filter_with_args() {
        let mut ctx = RenderContext::empty();
        let expr = parse_expression("\"hello world\" | truncate(5)").unwrap();
        assert_eq!(eval_expr(&expr, &mut ctx).unwrap(), json!("hello..."));
    }

    #[test]
    fn for_loop_iteration_limit_errors() {
        let mut ctx = ctx_with("input", json!({"items": [1, 2, 3]}));
        let nodes = crate::expression::parser::parse_template("{% for x in $input.items %}{{ x }}{% endfor %}").unwrap();
        let limits = RenderLimits { max_loop_iterations: 2 };
        let err = render_nodes_to_string(&nodes, &mut ctx, false, &limits).unwrap_err();
        assert_eq!(err, RenderError::LimitExceeded(LimitKind::Iterations));
    }

    #[test]
    fn for_loop_exposes_loop_index() {
        let mut ctx = ctx_with("input", json!({"items": ["a", "b", "c"]}));
        let nodes = crate::expression::parser::parse_template(
            "{% for x in $input.items %}{{ loop_index }}:{{ x }} {% endfor %}",
        )
        .unwrap();
        let limits = RenderLimits { max_loop_iterations: 10_000 };
        let out = render_nodes_to_string(&nodes, &mut ctx, false, &limits).unwrap();
        assert_eq!(out, "0:a 1:b 2:c ");
    }

    #[test]
    fn graceful_mode_emits_raw_on_parse_failure() {
        let nodes = crate::expression::parser::parse_template("{{ $ }}").unwrap();
        let mut ctx = RenderContext::empty();
        let limits = RenderLimits { max_loop_iterations: 10_000 };
        let out = render_nodes_to_string(&nodes, &mut ctx, true, &limits).unwrap();
        assert_eq!(out, "{{ $ }}");
    }
}
